//! # Base de Conhecimento de Synsets
//!
//! Glosas, domínios e polaridade por synset, para enriquecer a saída depois do
//! ranqueamento de sentidos. Linhas separadas por tab:
//!
//! ```text
//! d   bank   08420278-n   0.0   0.125   @finance   3   a financial institution
//! sb  @finance   @economy   @money
//! ```
//!
//! O escopo (`d` documento, `sd` sentença, `nd` sem escopo) só é guardado; `sb`
//! liga um domínio a outros.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{read_model_file, Result};
use crate::language::Word;
use crate::logging::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Document,
    Sentence,
    NoDisambiguation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub scope: Scope,
    pub lemma: String,
    pub synset: String,
    /// PoS do synset (sufixo após `-`).
    pub pos_tag: String,
    pub positive: f64,
    pub negative: f64,
    pub domain: String,
    pub score: i32,
    pub gloss: String,
}

#[derive(Debug, Default)]
pub struct KnowledgeBase {
    entries: HashMap<String, KnowledgeEntry>,
    binds: HashMap<String, BTreeSet<String>>,
}

impl KnowledgeBase {
    pub fn from_file(path: &Path, log: &Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Ok(Self::from_text(&text, log))
    }

    pub fn from_text(text: &str, log: &Logger) -> Self {
        let mut kb = Self::default();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let items: Vec<&str> = line.split('\t').map(str::trim).collect();
            let scope = match items[0] {
                "sb" => {
                    let Some(key) = items.get(1) else {
                        log.warn(format!("line {}: binding without domain", n + 1));
                        continue;
                    };
                    let targets = kb.binds.entry(strip_at(key).to_string()).or_default();
                    targets.extend(items[2..].iter().map(|d| strip_at(d).to_string()));
                    continue;
                }
                "sd" => Scope::Sentence,
                "nd" => Scope::NoDisambiguation,
                _ => Scope::Document,
            };
            let [_, lemma, synset, pos, neg, domain, score, gloss, ..] = items.as_slice() else {
                log.warn(format!("line {}: expected 8 tab-separated fields", n + 1));
                continue;
            };
            kb.entries.insert(
                synset.to_string(),
                KnowledgeEntry {
                    scope,
                    lemma: lemma.to_string(),
                    synset: synset.to_string(),
                    pos_tag: synset.split_once('-').map(|(_, p)| p).unwrap_or("").to_string(),
                    positive: pos.parse().unwrap_or(0.0),
                    negative: neg.parse().unwrap_or(0.0),
                    domain: strip_at(domain).to_string(),
                    score: score.parse().unwrap_or(0),
                    gloss: gloss.to_string(),
                },
            );
        }
        log.debug(format!("knowledge base loaded: {} synsets", kb.entries.len()));
        kb
    }

    pub fn lookup(&self, synset: &str) -> Option<&KnowledgeEntry> {
        self.entries.get(synset)
    }

    /// Domínios ligados a `domain` por linhas `sb`.
    pub fn bindings(&self, domain: &str) -> impl Iterator<Item = &str> {
        self.binds.get(domain).into_iter().flatten().map(String::as_str)
    }

    /// Entradas dos sentidos com score positivo da análise escolhida.
    pub fn annotate<'a>(&'a self, word: &Word) -> Vec<&'a KnowledgeEntry> {
        word.senses(0)
            .iter()
            .filter(|s| s.score > 0.0)
            .filter_map(|s| self.lookup(&s.synset))
            .collect()
    }
}

fn strip_at(s: &str) -> &str {
    s.strip_prefix('@').unwrap_or(s)
}
