//! # Desambiguação de Sentidos por PageRank (UKB)
//!
//! O grafo de relações do WordNet fica numa matriz esparsa comprimida (CSR):
//! para cada vértice, um intervalo contíguo em `edges` com seus vizinhos.
//!
//! A massa de personalização é distribuída entre os synsets candidatos das
//! palavras de conteúdo do documento; o PageRank personalizado propaga essa
//! massa pelo grafo e o rank final de cada synset vira o score do sentido.
//!
//! ```text
//! rank'(v) = d · Σ rank(u) / grau(u)  +  (1 - d) · pv(v)
//!            u→v
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config_file::{relative_to, ConfigFile};
use crate::error::{read_model_file, PlnError, Result};
use crate::language::Sentence;
use crate::logging::Logger;

const DEFAULT_WN_POS: &str = "^[NARV]";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRankParams {
    pub threshold: f64,
    pub max_iterations: usize,
    pub damping: f64,
}

impl Default for PageRankParams {
    fn default() -> Self {
        Self {
            threshold: 1e-6,
            max_iterations: 30,
            damping: 0.85,
        }
    }
}

/// Grafo de synsets em formato CSR.
#[derive(Debug, Clone, Default)]
pub struct CsrKb {
    params: PageRankParams,
    vertex_index: HashMap<String, usize>,
    out_coef: Vec<f64>,
    first_edge: Vec<usize>,
    num_edges: Vec<usize>,
    edges: Vec<usize>,
}

impl CsrKb {
    pub fn from_file(path: &Path, params: PageRankParams, log: &Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Ok(Self::from_relations(&text, params, log))
    }

    /// Linhas `syn1 syn2` (aresta nos dois sentidos) ou `syn1 -` (vértice isolado).
    pub fn from_relations(text: &str, params: PageRankParams, log: &Logger) -> Self {
        let mut kb = Self {
            params,
            ..Self::default()
        };
        let mut rels: Vec<(usize, usize)> = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let items: Vec<&str> = line.split_whitespace().collect();
            match items.as_slice() {
                [] => {}
                [syn1, "-", ..] => {
                    kb.add_vertex(syn1);
                }
                [syn1, syn2, ..] => {
                    let a = kb.add_vertex(syn1);
                    let b = kb.add_vertex(syn2);
                    rels.push((a, b));
                    rels.push((b, a));
                }
                [single] => log.warn(format!("relation line {} has a single synset '{single}'", n + 1)),
            }
        }
        kb.fill_tables(rels);
        log.debug(format!("knowledge graph loaded: {} vertices, {} edges", kb.len(), kb.edges.len()));
        kb
    }

    fn add_vertex(&mut self, synset: &str) -> usize {
        let next = self.vertex_index.len();
        *self.vertex_index.entry(synset.to_string()).or_insert(next)
    }

    fn fill_tables(&mut self, mut rels: Vec<(usize, usize)>) {
        rels.sort_unstable();
        let nv = self.len();
        self.edges = rels.iter().map(|&(_, to)| to).collect();
        self.first_edge = vec![0; nv];
        self.num_edges = vec![0; nv];
        self.out_coef = vec![0.0; nv];

        let mut r = 0;
        for v in 0..nv {
            self.first_edge[v] = r;
            while r < rels.len() && rels[r].0 == v {
                r += 1;
            }
            self.num_edges[v] = r - self.first_edge[v];
            if self.num_edges[v] > 0 {
                self.out_coef[v] = 1.0 / self.num_edges[v] as f64;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.vertex_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_index.is_empty()
    }

    /// Id do vértice do synset. Todo id, inclusive 0, é válido.
    pub fn vertex(&self, synset: &str) -> Option<usize> {
        self.vertex_index.get(synset).copied()
    }

    pub fn params(&self) -> &PageRankParams {
        &self.params
    }

    /// PageRank personalizado por `pv`. Para quando a variação total fica abaixo do
    /// limiar ou no máximo de iterações.
    pub fn page_rank(&self, pv: &[f64]) -> Vec<f64> {
        let nv = self.len();
        if nv == 0 {
            return vec![];
        }
        let PageRankParams {
            threshold,
            max_iterations,
            damping,
        } = self.params;

        let mut current = vec![1.0 / nv as f64; nv];
        let mut next = vec![0.0; nv];
        let mut change = threshold;
        let mut it = 0;
        while it < max_iterations && change >= threshold {
            change = 0.0;
            for v in 0..nv {
                let start = self.first_edge[v];
                let rank: f64 = self.edges[start..start + self.num_edges[v]]
                    .iter()
                    .map(|&u| current[u] * self.out_coef[u])
                    .sum();
                next[v] = rank * damping + pv.get(v).copied().unwrap_or(0.0) * (1.0 - damping);
                change += (next[v] - current[v]).abs();
            }
            std::mem::swap(&mut current, &mut next);
            it += 1;
        }
        current
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    RelationFile,
    WnPos,
    PageRank,
}

/// Ranqueia os sentidos de um documento inteiro.
#[derive(Debug)]
pub struct Ukb {
    kb: CsrKb,
    wn_pos: Regex,
    log: Logger,
}

impl Ukb {
    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, log)
    }

    /// O arquivo de relações é resolvido relativo a `name`.
    pub fn from_text(name: &str, text: &str, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_section("RelationFile", Section::RelationFile)
            .with_section("RE_Wordnet_PoS", Section::WnPos)
            .with_section("PageRankParameters", Section::PageRank);

        let mut params = PageRankParams::default();
        let mut wn_pos = Regex::new(DEFAULT_WN_POS)?;
        let mut relations = None;

        while let Some(line) = cfg.next_line()? {
            let items = line.fields();
            let Some(&key) = items.first() else {
                continue;
            };
            match line.section {
                Section::RelationFile => relations = Some(relative_to(Path::new(name), key)),
                Section::WnPos => wn_pos = Regex::new(line.text.trim())?,
                Section::PageRank => {
                    let value = items.get(1).copied().unwrap_or("");
                    let bad = || PlnError::config(name, line.line, format!("invalid value '{value}' for {key}"));
                    match key {
                        "Threshold" => params.threshold = value.parse().map_err(|_| bad())?,
                        "MaxIterations" => params.max_iterations = value.parse().map_err(|_| bad())?,
                        "Damping" => params.damping = value.parse().map_err(|_| bad())?,
                        other => log.warn(format!("unknown parameter {other} in PageRankParameters section of {name}")),
                    }
                }
            }
        }

        let Some(relations) = relations else {
            return Err(PlnError::MissingFile(format!("relation file in UKB configuration {name}")));
        };
        let kb = CsrKb::from_file(&relations, params, &log)?;
        Ok(Self::new(kb, wn_pos, log))
    }

    pub fn new(kb: CsrKb, wn_pos: Regex, log: Logger) -> Self {
        Self { kb, wn_pos, log }
    }

    /// Vetor de personalização: cada palavra de conteúdo distinta recebe massa
    /// `1/n`, dividida igualmente entre seus synsets.
    pub fn personalization(&self, sentences: &[Sentence]) -> Vec<f64> {
        let mut pv = vec![0.0; self.kb.len()];
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for w in sentences.iter().flat_map(|s| &s.words) {
            let tag = w.tag(0);
            if !self.wn_pos.is_match(tag) {
                continue;
            }
            let pos: String = tag.chars().take(1).flat_map(char::to_lowercase).collect();
            if seen.insert(format!("{}#{pos}", w.lc_form)) {
                unique.push(w);
            }
        }

        let nw = unique.len() as f64;
        for w in unique {
            let senses = w.senses(0);
            let share = 1.0 / nw / senses.len() as f64;
            for s in senses {
                match self.kb.vertex(&s.synset) {
                    Some(v) => pv[v] += share,
                    None => self.log.warn(format!(
                        "unknown synset {} ignored, check consistency between sense dictionary and graph",
                        s.synset
                    )),
                }
            }
        }
        pv
    }

    /// Substitui os scores dos sentidos pelos ranks e ordena do maior para o menor.
    pub fn analyze(&self, sentences: &mut [Sentence]) {
        let pv = self.personalization(sentences);
        let ranks = self.kb.page_rank(&pv);
        for w in sentences.iter_mut().flat_map(|s| s.words.iter_mut()) {
            let Some(a) = w.first_selected_mut(0) else {
                continue;
            };
            for s in &mut a.senses {
                if let Some(v) = self.kb.vertex(&s.synset) {
                    s.score = ranks[v];
                }
            }
            a.senses.sort_by(|x, y| y.score.total_cmp(&x.score));
        }
        self.log.trace("senses ranked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{Analysis, Sense, Word};

    const RELATIONS: &str = "bank-n river-n\nriver-n water-n\nbank-n money-n\nmoney-n finance-n\nisolated-n -\n";

    fn kb() -> CsrKb {
        CsrKb::from_relations(RELATIONS, PageRankParams::default(), &Logger::null())
    }

    fn word(form: &str, tag: &str, senses: &[&str]) -> Word {
        let mut w = Word::new(form);
        let mut a = Analysis::new(form, tag).with_prob(1.0);
        a.senses = senses.iter().map(|s| Sense::new(*s, 0.0)).collect();
        w.set_analysis(vec![a]);
        w
    }

    #[test]
    fn test_vertices_in_first_seen_order() {
        let kb = kb();
        assert_eq!(kb.vertex("bank-n"), Some(0));
        assert_eq!(kb.vertex("river-n"), Some(1));
        assert_eq!(kb.vertex("isolated-n"), Some(5));
        assert_eq!(kb.vertex("nothing"), None);
        assert_eq!(kb.len(), 6);
    }

    #[test]
    fn test_uniform_pagerank_sums_to_one_without_isolated() {
        let kb = CsrKb::from_relations("a b\nb c\nc a\n", PageRankParams::default(), &Logger::null());
        let ranks = kb.page_rank(&[1.0 / 3.0; 3]);
        assert!((ranks.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((ranks[0] - ranks[1]).abs() < 1e-9);
    }

    #[test]
    fn test_personalization_mass_is_shared() {
        let ukb = Ukb::new(kb(), Regex::new(DEFAULT_WN_POS).unwrap(), Logger::null());
        let s = Sentence::from_words(vec![
            word("bank", "NN", &["bank-n", "river-n"]),
            word("money", "NN", &["money-n"]),
            word("the", "DT", &["finance-n"]),
            word("bank", "NN", &["bank-n", "river-n"]),
        ]);
        let pv = ukb.personalization(&[s]);
        assert!((pv.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((pv[0] - 0.25).abs() < 1e-12);
        assert!((pv[3] - 0.5).abs() < 1e-12);
        assert_eq!(pv[4], 0.0);
    }

    #[test]
    fn test_context_ranks_related_sense_first() {
        let ukb = Ukb::new(kb(), Regex::new(DEFAULT_WN_POS).unwrap(), Logger::null());
        let mut doc = vec![Sentence::from_words(vec![
            word("bank", "NN", &["river-n", "bank-n"]),
            word("finance", "NN", &["finance-n"]),
            word("money", "NN", &["money-n"]),
        ])];
        ukb.analyze(&mut doc);
        let senses = doc[0].words[0].senses(0);
        assert_eq!(senses[0].synset, "bank-n");
        assert!(senses[0].score > senses[1].score);
    }

    #[test]
    fn test_loads_config_and_relations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wn.rel"), RELATIONS).unwrap();
        let path = dir.path().join("ukb.dat");
        std::fs::write(
            &path,
            "<RelationFile>\n./wn.rel\n</RelationFile>\n<PageRankParameters>\nDamping 0.5\nMaxIterations 10\n</PageRankParameters>\n",
        )
        .unwrap();
        let ukb = Ukb::from_file(&path, Logger::null()).unwrap();
        assert_eq!(ukb.kb.params().damping, 0.5);
        assert_eq!(ukb.kb.params().max_iterations, 10);
        assert_eq!(ukb.kb.len(), 6);
    }

    #[test]
    fn test_missing_relation_file_is_fatal() {
        let err = Ukb::from_text("ukb.dat", "<PageRankParameters>\nDamping 0.5\n</PageRankParameters>\n", Logger::null())
            .unwrap_err();
        assert!(matches!(err, PlnError::MissingFile(_)));
    }
}
