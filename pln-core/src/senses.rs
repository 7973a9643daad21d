//! # Anotação de Sentidos
//!
//! Associa a cada análise os synsets candidatos da [`SemanticDb`], com score 0.
//! O ranqueamento fica para o [`Ukb`](crate::ukb::Ukb).
//!
//! Com `<DuplicateAnalysis>` em `yes`, cada sentido vira uma análise própria,
//! dividindo a probabilidade da original.

use std::path::Path;

use crate::config_file::ConfigFile;
use crate::error::{read_model_file, Result};
use crate::language::{Analysis, Sense, Sentence};
use crate::logging::Logger;
use crate::semdb::SemanticDb;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    DuplicateAnalysis,
}

#[derive(Debug)]
pub struct Senses {
    semdb: SemanticDb,
    duplicate: bool,
    log: Logger,
}

impl Senses {
    /// O mesmo arquivo configura a base semântica e esta etapa.
    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        let semdb = SemanticDb::from_file(path, log.for_module("semdb"))?;
        let text = read_model_file(path)?;
        let duplicate = Self::parse_duplicate(&path.display().to_string(), &text, &log)?;
        log.debug("sense annotator loaded");
        Ok(Self { semdb, duplicate, log })
    }

    pub fn new(semdb: SemanticDb, duplicate: bool, log: Logger) -> Self {
        Self { semdb, duplicate, log }
    }

    fn parse_duplicate(name: &str, text: &str, log: &Logger) -> Result<bool> {
        let mut cfg = ConfigFile::from_text(name, text, true, log.clone())
            .with_section("DuplicateAnalysis", Section::DuplicateAnalysis);
        let mut duplicate = false;
        while let Some(line) = cfg.next_line()? {
            if line.fields().first() == Some(&"yes") {
                duplicate = true;
            }
        }
        Ok(duplicate)
    }

    pub fn semdb(&self) -> &SemanticDb {
        &self.semdb
    }

    pub fn analyze(&self, sentence: &mut Sentence) {
        for w in &mut sentence.words {
            let mut expanded: Vec<Analysis> = Vec::new();
            for a in &mut w.analyses {
                let synsets = self.semdb.word_senses(&w.lc_form, &a.lemma, &a.tag);
                if synsets.is_empty() {
                    if self.duplicate {
                        expanded.push(a.clone());
                    }
                    continue;
                }
                if self.duplicate {
                    let prob = a.prob / synsets.len() as f64;
                    for s in synsets {
                        self.log.trace(format!("duplicating analysis for sense {s}"));
                        let mut dup = a.clone();
                        dup.senses = vec![Sense::new(s, 0.0)];
                        dup.prob = prob;
                        expanded.push(dup);
                    }
                } else {
                    a.senses = synsets.into_iter().map(|s| Sense::new(s, 0.0)).collect();
                }
            }
            if self.duplicate {
                w.analyses = expanded;
            }
        }
        self.log.trace("sentence annotated with senses");
    }
}
