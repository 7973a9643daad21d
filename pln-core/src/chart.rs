//! # Chart Parser (Chunker)
//!
//! Parsing bottom-up estilo CYK sobre uma tabela triangular. A célula `(k, i)`
//! guarda as arestas que cobrem as palavras `i..=i+k`:
//!
//! ```text
//! k=2 │ (2,0)
//! k=1 │ (1,0) (1,1)
//! k=0 │ (0,0) (0,1) (0,2)
//!     └─────────────────
//!       John  went  home
//! ```
//!
//! - **Aresta inativa**: regra completa, pode estender outras.
//! - **Aresta ativa**: ainda espera símbolos à direita.
//!
//! Se nenhuma aresta completa cobre a sentença inteira, [`Chart::cover`] escolhe
//! pedaços maximais e uma regra fictícia do símbolo inicial os junta.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{PlnError, Result};
use crate::grammar::{Grammar, Rule, NO_GOVERNOR};
use crate::language::Sentence;
use crate::logging::Logger;
use crate::parse_tree::ParseTree;

/// Aplicação parcial de uma regra: `matched . restante`.
#[derive(Debug, Clone)]
pub struct Edge {
    rule: Arc<Rule>,
    dot: usize,
    /// Células `(k, i)` que cobriram cada símbolo consumido.
    backpath: Vec<(usize, usize)>,
}

impl Edge {
    pub fn new(rule: Arc<Rule>) -> Self {
        Self {
            rule,
            dot: 0,
            backpath: vec![],
        }
    }

    /// Aresta inativa para um símbolo terminal da palavra.
    pub fn terminal(label: impl Into<String>) -> Self {
        Self::new(Arc::new(Rule::new(label, vec![], 0)))
    }

    pub fn head(&self) -> &str {
        &self.rule.head
    }

    pub fn governor(&self) -> usize {
        self.rule.governor
    }

    pub fn is_active(&self) -> bool {
        self.dot < self.rule.right.len()
    }

    pub fn matched(&self) -> &[String] {
        &self.rule.right[..self.dot]
    }

    pub fn backpath(&self) -> &[(usize, usize)] {
        &self.backpath
    }

    fn next_symbol(&self) -> Option<&str> {
        self.rule.right.get(self.dot).map(String::as_str)
    }

    fn shift(&mut self, k: usize, i: usize) {
        self.dot += 1;
        self.backpath.push((k, i));
    }
}

/// Tabela de um parse; vive só durante a análise de uma sentença.
#[derive(Debug)]
pub struct Chart<'g> {
    grammar: &'g Grammar,
    table: Vec<Vec<Edge>>,
    size: usize,
    log: &'g Logger,
}

impl<'g> Chart<'g> {
    pub fn new(grammar: &'g Grammar, log: &'g Logger) -> Self {
        Self {
            grammar,
            table: vec![],
            size: 0,
            log,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn index(&self, k: usize, i: usize) -> usize {
        i + k * (self.size + 1) - (k + 1) * k / 2
    }

    pub fn cell(&self, k: usize, i: usize) -> &[Edge] {
        &self.table[self.index(k, i)]
    }

    /// Semeia a linha 0 com `tag`, `tag(forma)` e `tag<lema>` de cada análise
    /// selecionada para `k`, fechando sob as regras.
    pub fn load_sentence(&mut self, sentence: &Sentence, k: usize) {
        self.size = sentence.len();
        self.table = vec![vec![]; (self.size + 1) * self.size / 2];
        for (j, w) in sentence.words.iter().enumerate() {
            let mut cell = vec![];
            for a in w.selected(k) {
                for label in [
                    a.tag.clone(),
                    format!("{}({})", a.tag, w.lc_form),
                    format!("{}<{}>", a.tag, a.lemma),
                ] {
                    let e = Edge::terminal(label);
                    let head = e.head().to_string();
                    cell.push(e);
                    self.find_all_rules(&head, &mut cell, 0, j);
                }
            }
            let idx = self.index(0, j);
            self.table[idx] = cell;
        }
    }

    /// Preenche as linhas superiores e garante uma raiz em `(size-1, 0)`.
    pub fn parse(&mut self) -> Result<()> {
        if self.size == 0 {
            return Ok(());
        }
        for k in 1..self.size {
            for i in 0..self.size - k {
                let mut cell = vec![];
                for a in 0..k {
                    for edge in self.cell(a, i) {
                        let Some(next) = edge.next_symbol() else {
                            continue;
                        };
                        if !self.can_extend(next, k - a - 1, i + a + 1) {
                            continue;
                        }
                        let mut e = edge.clone();
                        e.shift(k - a - 1, i + a + 1);
                        let complete = !e.is_active();
                        let head = e.head().to_string();
                        cell.push(e);
                        if complete {
                            self.find_all_rules(&head, &mut cell, k, i);
                        }
                    }
                }
                let idx = self.index(k, i);
                self.table[idx] = cell;
            }
        }

        let top = self.size - 1;
        let has_root = self
            .best_edge(top, 0, |e| !self.grammar.is_notop(e.head()))
            .is_some();
        if !has_root {
            self.log.trace(format!("adding fictitious root at ({top},0)"));
            let pieces = self.cover(top as isize, 0)?;
            let mut heads = Vec::with_capacity(pieces.len());
            for &(x, y) in &pieces {
                let best = self
                    .best_edge(x, y, |_| true)
                    .ok_or(PlnError::InconsistentChart { len: x, start: y })?;
                heads.push(best.head().to_string());
            }
            let rule = Rule::new(self.grammar.start_symbol(), heads, NO_GOVERNOR);
            let mut root = Edge::new(Arc::new(rule));
            for &(x, y) in &pieces {
                root.shift(x, y);
            }
            let idx = self.index(top, 0);
            self.table[idx].push(root);
        }
        Ok(())
    }

    /// Melhor aresta inativa da célula entre as que passam em `filter`.
    fn best_edge(&self, k: usize, i: usize, filter: impl Fn(&Edge) -> bool) -> Option<&Edge> {
        let mut best: Option<&Edge> = None;
        for e in self.cell(k, i) {
            if !e.is_active() && filter(e) && self.better_edge(e, best) {
                best = Some(e);
            }
        }
        best
    }

    /// Cobre a região `(a, b)` com arestas inativas maximais, da maior para as
    /// menores, devolvendo as células em ordem da esquerda para a direita.
    pub fn cover(&self, a: isize, b: isize) -> Result<Vec<(usize, usize)>> {
        if a < 0 || b < 0 || (a + b) as usize >= self.size {
            return Ok(vec![]);
        }
        let (a, b) = (a as usize, b as usize);
        let mut found: Option<(usize, usize, &Edge)> = None;
        for i in (0..=a).rev() {
            for j in b..=b + (a - i) {
                for e in self.cell(i, j) {
                    if !e.is_active() && self.better_edge(e, found.map(|(_, _, best)| best)) {
                        found = Some((i, j, e));
                    }
                }
            }
            if found.is_some() {
                break;
            }
        }
        let Some((x, y, _)) = found else {
            return Err(PlnError::InconsistentChart { len: a, start: b });
        };

        let mut pieces = self.cover(y as isize - b as isize - 1, b as isize)?;
        pieces.push((x, y));
        pieces.extend(self.cover(
            (a + b) as isize - (x + y + 1) as isize,
            (x + y + 1) as isize,
        )?);
        Ok(pieces)
    }

    /// Verdadeiro se `e1` é preferível a `e2` (qualquer aresta vence a ausência).
    ///
    /// 1. Cabeça igual ao símbolo inicial.
    /// 2. Entre terminais, o mais específico.
    /// 3. Entre não terminais, a menor prioridade e depois mais símbolos consumidos.
    /// 4. Não terminal vence terminal.
    pub fn better_edge(&self, e1: &Edge, e2: Option<&Edge>) -> bool {
        let Some(e2) = e2 else {
            return true;
        };
        let g = self.grammar;
        let (h1, h2) = (e1.head(), e2.head());
        let start = g.start_symbol();
        if h1 == start && h2 != start {
            return true;
        }
        if h1 != start && h2 == start {
            return false;
        }
        match (g.is_terminal(h1), g.is_terminal(h2)) {
            (true, true) => g.specificity(h1) < g.specificity(h2),
            (false, false) => match g.priority(h1).cmp(&g.priority(h2)) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => e1.matched().len() > e2.matched().len(),
            },
            (h1_terminal, _) => !h1_terminal,
        }
    }

    /// Verdadeiro se alguma aresta inativa da célula `(k, i)` casa com `symbol`.
    pub fn can_extend(&self, symbol: &str, k: usize, i: usize) -> bool {
        self.cell(k, i)
            .iter()
            .any(|e| !e.is_active() && self.check_match(symbol, e.head()))
    }

    /// Casa o símbolo esperado pela regra (`searched`) com a cabeça de uma aresta
    /// (`found`). Curingas `*` casam por prefixo, mantendo a qualificação; se ela
    /// for um arquivo, a palavra precisa estar na lista.
    pub fn check_match(&self, searched: &str, found: &str) -> bool {
        if searched == found {
            return true;
        }
        let Some(star) = searched.find('*') else {
            return false;
        };
        if !found.starts_with(&searched[..star]) {
            return false;
        }
        let qualifier = |s: &str| s.find(['(', '<']);
        let (bare, found_qual) = match qualifier(found) {
            Some(n) => found.split_at(n),
            None => (found, ""),
        };
        let searched_qual = qualifier(searched).map_or("", |n| &searched[n..]);
        if searched_qual.contains('"') {
            self.grammar.in_file_map(found_qual, searched_qual)
        } else {
            format!("{bare}{searched_qual}") == found
        }
    }

    /// Adiciona à célula todas as arestas disparadas por uma aresta completa com
    /// cabeça `head`, fechando transitivamente sob regras unárias.
    pub fn find_all_rules(&self, head: &str, cell: &mut Vec<Edge>, k: usize, i: usize) {
        let mut pending = VecDeque::new();
        if self.grammar.is_terminal(head) {
            if let Some(initial) = head.chars().next() {
                for rule in self.grammar.wildcard_rules(initial) {
                    if !self.check_match(&rule.right[0], head) {
                        continue;
                    }
                    let mut e = Edge::new(Arc::clone(rule));
                    e.shift(k, i);
                    if !e.is_active() {
                        pending.push_back(e.head().to_string());
                    }
                    cell.push(e);
                }
            }
        }

        let mut expanded = HashSet::new();
        pending.push_back(head.to_string());
        while let Some(symbol) = pending.pop_front() {
            if !expanded.insert(symbol.clone()) {
                continue;
            }
            for rule in self.grammar.rules_for(&symbol) {
                let mut e = Edge::new(Arc::clone(rule));
                e.shift(k, i);
                if !e.is_active() {
                    pending.push_back(e.head().to_string());
                }
                cell.push(e);
            }
        }
    }

    /// Reconstrói a árvore da célula `(x, y)`. Sem rótulo, usa a melhor aresta
    /// completa não oculta. Filhos ocultos, `@ONLYTOP` ou `@FLAT` com o mesmo
    /// rótulo do pai têm seus filhos elevados.
    pub fn get_tree(&self, x: usize, y: usize, label: Option<&str>) -> Result<ParseTree> {
        let g = self.grammar;
        let label = match label {
            Some(l) => l.to_string(),
            None => self
                .best_edge(x, y, |e| !g.is_hidden(e.head()))
                .map(|e| e.head().to_string())
                .ok_or(PlnError::InconsistentChart { len: x, start: y })?,
        };
        let mut tree = ParseTree::new(label.as_str());
        if g.is_terminal(&label) && label != g.start_symbol() {
            return Ok(tree);
        }

        let best = self
            .best_edge(x, y, |e| e.head() == label)
            .ok_or(PlnError::InconsistentChart { len: x, start: y })?;
        let gov = best.governor();
        let root = tree.root();
        let mut head_set = false;
        for (ch, (symbol, &(px, py))) in best.matched().iter().zip(best.backpath()).enumerate() {
            let child = self.get_tree(px, py, Some(symbol))?;
            let child_label = &child.node(child.root()).label;
            let raise =
                g.is_hidden(child_label) || g.is_onlytop(child_label) || (g.is_flat(child_label) && *child_label == label);
            if raise {
                for &grandchild in child.children(child.root()) {
                    let id = tree.append_subtree(root, &child, grandchild);
                    if ch == gov {
                        head_set = true;
                    } else {
                        tree.node_mut(id).head = false;
                    }
                }
            } else {
                let id = tree.append_child(root, &child);
                if ch == gov {
                    tree.node_mut(id).head = true;
                    head_set = true;
                }
            }
        }
        if !head_set && label != g.start_symbol() {
            self.log.warn(format!("unset rule governor for {label} at ({x},{y})"));
        }
        Ok(tree)
    }
}

/// Chunker: uma árvore por sequência k-best da sentença.
#[derive(Debug)]
pub struct ChartParser {
    grammar: Grammar,
    log: Logger,
}

impl ChartParser {
    pub fn new(grammar: Grammar, log: Logger) -> Self {
        Self { grammar, log }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn start_symbol(&self) -> &str {
        self.grammar.start_symbol()
    }

    pub fn analyze(&self, sentence: &mut Sentence) -> Result<()> {
        if sentence.is_empty() {
            return Ok(());
        }
        for k in 0..sentence.num_kbest() {
            let mut chart = Chart::new(&self.grammar, &self.log);
            chart.load_sentence(sentence, k);
            chart.parse()?;
            let mut tree = chart.get_tree(chart.size() - 1, 0, None)?;

            for (leaf, (pos, w)) in tree.leaves().into_iter().zip(sentence.words.iter().enumerate()) {
                let node = tree.node_mut(leaf);
                node.word = Some(pos);
                node.label = w.tag(k).to_string();
            }
            let root = tree.root();
            let top: Vec<_> = tree.children(root).to_vec();
            for (n, child) in top.into_iter().enumerate() {
                tree.node_mut(child).chunk = n + 1;
            }
            sentence.set_parse_tree(k, tree);
        }
        self.log.trace("sentence chunked");
        Ok(())
    }
}
