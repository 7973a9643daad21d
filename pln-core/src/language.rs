//! # Modelo de Dados Linguístico
//!
//! Tipos que fluem por todas as etapas do pipeline:
//!
//! - [`Analysis`]: um par (lema, tag) com probabilidade, sentidos e marcação k-best.
//! - [`Word`]: um token com suas análises candidatas.
//! - [`Sentence`]: sequência de palavras com árvores sintáticas por índice k-best.
//!
//! As árvores sintáticas ficam em [`crate::parse_tree`].

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::parse_tree::ParseTree;

/// Um sentido candidato (synset) com seu score de ranqueamento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sense {
    pub synset: String,
    pub score: f64,
}

impl Sense {
    pub fn new(synset: impl Into<String>, score: f64) -> Self {
        Self {
            synset: synset.into(),
            score,
        }
    }
}

/// Uma análise morfológica candidata de uma palavra.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Lema (forma canônica).
    pub lemma: String,
    /// Tag morfossintática completa (ex: `NCMS000`).
    pub tag: String,
    /// Probabilidade lexical. Negativa quando ainda não atribuída.
    pub prob: f64,
    pub distance: f64,
    /// Sentidos candidatos, ranqueados pelo UKB quando disponível.
    pub senses: Vec<Sense>,
    /// Palavras em que a forma se expande se for retokenizada (ex: "del" → "de" + "el").
    pub retok: Vec<Word>,
    /// Índices k-best para os quais esta análise está selecionada.
    pub selected: BTreeSet<usize>,
}

impl Analysis {
    pub fn new(lemma: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            lemma: lemma.into(),
            tag: tag.into(),
            prob: -1.0,
            distance: -1.0,
            senses: vec![],
            retok: vec![],
            selected: BTreeSet::new(),
        }
    }

    pub fn with_prob(mut self, prob: f64) -> Self {
        self.prob = prob;
        self
    }

    pub fn has_prob(&self) -> bool {
        self.prob >= 0.0
    }

    pub fn is_retokenizable(&self) -> bool {
        !self.retok.is_empty()
    }

    pub fn is_selected(&self, k: usize) -> bool {
        self.selected.contains(&k)
    }

    pub fn mark_selected(&mut self, k: usize) {
        self.selected.insert(k);
    }

    pub fn unmark_selected(&mut self, k: usize) {
        self.selected.remove(&k);
    }

    /// Maior índice k-best selecionado, se houver.
    pub fn max_kbest(&self) -> Option<usize> {
        self.selected.iter().next_back().copied()
    }
}

/// Um token da sentença com suas análises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Forma de superfície como aparece no texto.
    pub form: String,
    /// Forma em minúsculas (chave de busca nos dicionários).
    pub lc_form: String,
    /// Forma fonética (não preenchida pelos módulos atuais).
    pub ph_form: String,
    /// Componentes, quando a palavra é uma multipalavra.
    pub multiword: Vec<Word>,
    pub ambiguous_mw: bool,
    /// Offset de byte inicial no texto original.
    pub start: usize,
    /// Offset de byte final (exclusivo).
    pub finish: usize,
    /// Encontrada no dicionário (ou equivalente).
    pub in_dict: bool,
    /// Análise fixada (ex: pontuação); módulos posteriores não a alteram.
    pub locked: bool,
    /// Posição na sentença após o último `rebuild_word_index`.
    pub position: usize,
    /// Marcada para remoção (absorvida por uma multipalavra).
    pub expired: bool,
    pub analyses: Vec<Analysis>,
}

impl Word {
    pub fn new(form: impl Into<String>) -> Self {
        let form = form.into();
        Self {
            lc_form: form.to_lowercase(),
            form,
            ph_form: String::new(),
            multiword: vec![],
            ambiguous_mw: false,
            start: 0,
            finish: 0,
            in_dict: true,
            locked: false,
            position: 0,
            expired: false,
            analyses: vec![],
        }
    }

    pub fn with_span(mut self, start: usize, finish: usize) -> Self {
        self.start = start;
        self.finish = finish;
        self
    }

    /// Cria uma multipalavra a partir de seus componentes; o span vai do primeiro ao último.
    pub fn multiword(form: impl Into<String>, components: Vec<Word>) -> Self {
        let mut w = Word::new(form);
        w.start = components.first().map(|c| c.start).unwrap_or(0);
        w.finish = components.last().map(|c| c.finish).unwrap_or(0);
        w.multiword = components;
        w
    }

    pub fn is_multiword(&self) -> bool {
        !self.multiword.is_empty()
    }

    /// Substitui as análises, todas selecionadas para k=0.
    pub fn set_analysis(&mut self, analyses: Vec<Analysis>) {
        self.analyses = analyses;
        for a in &mut self.analyses {
            a.mark_selected(0);
        }
    }

    /// Acrescenta uma análise selecionada para k=0.
    pub fn add_analysis(&mut self, mut analysis: Analysis) {
        analysis.mark_selected(0);
        self.analyses.push(analysis);
    }

    pub fn n_analyses(&self) -> usize {
        self.analyses.len()
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn select_all(&mut self, k: usize) {
        for a in &mut self.analyses {
            a.mark_selected(k);
        }
    }

    pub fn unselect_all(&mut self, k: usize) {
        for a in &mut self.analyses {
            a.unmark_selected(k);
        }
    }

    pub fn n_selected(&self, k: usize) -> usize {
        self.analyses.iter().filter(|a| a.is_selected(k)).count()
    }

    /// Análises selecionadas para o índice `k`.
    pub fn selected(&self, k: usize) -> impl Iterator<Item = &Analysis> {
        self.analyses.iter().filter(move |a| a.is_selected(k))
    }

    pub fn first_selected(&self, k: usize) -> Option<&Analysis> {
        self.analyses.iter().find(|a| a.is_selected(k))
    }

    pub fn first_selected_mut(&mut self, k: usize) -> Option<&mut Analysis> {
        self.analyses.iter_mut().find(|a| a.is_selected(k))
    }

    /// Número de sequências k-best em que esta palavra participa.
    pub fn num_kbest(&self) -> usize {
        self.analyses
            .iter()
            .filter_map(Analysis::max_kbest)
            .map(|k| k + 1)
            .max()
            .unwrap_or(0)
    }

    /// Lema da primeira análise selecionada para `k`.
    pub fn lemma(&self, k: usize) -> &str {
        self.first_selected(k).map(|a| a.lemma.as_str()).unwrap_or("")
    }

    /// Tag da primeira análise selecionada para `k`.
    pub fn tag(&self, k: usize) -> &str {
        self.first_selected(k).map(|a| a.tag.as_str()).unwrap_or("")
    }

    pub fn senses(&self, k: usize) -> &[Sense] {
        self.first_selected(k).map(|a| a.senses.as_slice()).unwrap_or(&[])
    }

    pub fn set_senses(&mut self, k: usize, senses: Vec<Sense>) {
        if let Some(a) = self.first_selected_mut(k) {
            a.senses = senses;
        }
    }

    /// Verdadeiro se alguma análise tem tag casando com `re`.
    pub fn find_tag_match(&self, re: &Regex) -> bool {
        self.analyses.iter().any(|a| re.is_match(&a.tag))
    }

    pub fn has_retokenizable(&self) -> bool {
        self.analyses.iter().any(Analysis::is_retokenizable)
    }

    /// Ordena as análises por probabilidade decrescente (estável).
    pub fn sort_by_prob(&mut self) {
        self.analyses
            .sort_by(|a, b| b.prob.partial_cmp(&a.prob).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Renderização de depuração: `forma/tag:[synset:score|...]`.
    pub fn form_tag(&self) -> String {
        let chosen = self.analyses.iter().find(|a| !a.selected.is_empty());
        let tag = chosen.map(|a| a.tag.as_str()).unwrap_or("");
        let senses: Vec<String> = chosen
            .map(|a| {
                a.senses
                    .iter()
                    .filter(|s| s.score > 0.0 && !s.synset.is_empty())
                    .map(|s| format!("{}:{:.3}", s.synset, s.score))
                    .collect()
            })
            .unwrap_or_default();
        format!("{}/{}:[{}]", self.form, tag, senses.join("|"))
    }
}

/// Uma sentença: palavras, identificador e árvores sintáticas por k-best.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: String,
    pub words: Vec<Word>,
    pub trees: BTreeMap<usize, ParseTree>,
}

impl Sentence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words(words: Vec<Word>) -> Self {
        let mut s = Self {
            words,
            ..Self::default()
        };
        s.rebuild_word_index();
        s
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn push(&mut self, mut word: Word) {
        word.position = self.words.len();
        self.words.push(word);
    }

    /// Remove palavras expiradas e renumera as posições.
    pub fn rebuild_word_index(&mut self) {
        self.words.retain(|w| !w.expired);
        for (i, w) in self.words.iter_mut().enumerate() {
            w.position = i;
        }
    }

    /// Número de sequências k-best anotadas (pela primeira palavra).
    pub fn num_kbest(&self) -> usize {
        self.words.first().map(Word::num_kbest).unwrap_or(0)
    }

    /// Guarda a árvore do índice `k`, numerando seus nós com o id da sentença.
    pub fn set_parse_tree(&mut self, k: usize, mut tree: ParseTree) {
        tree.build_node_index(&self.id);
        self.trees.insert(k, tree);
    }

    pub fn parse_tree(&self, k: usize) -> Option<&ParseTree> {
        self.trees.get(&k)
    }

    /// Formas de superfície unidas por espaço.
    pub fn body(&self) -> String {
        self.words
            .iter()
            .map(|w| w.form.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Padrão de capitalização de uma forma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capitalization {
    None,
    All,
    First,
}

/// Primeiro grafema da string.
pub fn first_grapheme(s: &str) -> &str {
    s.graphemes(true).next().unwrap_or("")
}

/// Verdadeiro se a primeira letra é maiúscula.
pub fn starts_upper(s: &str) -> bool {
    first_grapheme(s).chars().next().is_some_and(char::is_uppercase)
}

/// Verdadeiro se tem letras e nenhuma minúscula.
pub fn is_all_caps(s: &str) -> bool {
    s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase)
}

/// Verdadeiro se contém alguma letra minúscula.
pub fn has_lowercase(s: &str) -> bool {
    s.chars().any(char::is_lowercase)
}

pub fn capitalization(s: &str) -> Capitalization {
    if is_all_caps(s) {
        Capitalization::All
    } else if starts_upper(s) {
        Capitalization::First
    } else {
        Capitalization::None
    }
}

/// Primeira letra em maiúscula, resto intacto.
pub fn capitalize_first(s: &str) -> String {
    let head = first_grapheme(s);
    format!("{}{}", head.to_uppercase(), &s[head.len()..])
}

/// Reaplica a capitalização `caps` a `form`. `init` indica se é o primeiro componente.
pub fn apply_capitalization(form: &str, caps: Capitalization, init: bool) -> String {
    match caps {
        Capitalization::All => form.to_uppercase(),
        Capitalization::First if init => capitalize_first(form),
        _ => form.to_string(),
    }
}
