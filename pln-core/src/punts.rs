//! Marcação de pontuação.
//!
//! Base `forma lema tag`; a entrada especial `<Other>` dá a tag de qualquer token
//! desconhecido que não começa com letra ou dígito.

use std::path::Path;

use crate::database::Database;
use crate::error::Result;
use crate::language::{Analysis, Sentence};
use crate::logging::Logger;

const OTHER: &str = "<Other>";

#[derive(Debug, Clone)]
pub struct Punts {
    db: Database,
    tag_others: String,
    log: Logger,
}

impl Punts {
    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        Ok(Self::from_database(Database::from_file(path)?, log))
    }

    pub fn from_text(text: &str, log: Logger) -> Self {
        Self::from_database(Database::from_text(text), log)
    }

    fn from_database(db: Database, log: Logger) -> Self {
        let tag_others = db.access(OTHER).to_string();
        Self { db, tag_others, log }
    }

    pub fn analyze(&self, sentence: &mut Sentence) {
        for word in &mut sentence.words {
            let data = self.db.access(&word.form);
            if let Some((lemma, tag)) = data.split_once(' ') {
                self.log.trace(format!("[{}] found in map: known punctuation", word.form));
                word.set_analysis(vec![Analysis::new(lemma, tag.trim())]);
                word.lock();
            } else if !data.is_empty() {
                word.set_analysis(vec![Analysis::new(data, data)]);
                word.lock();
            } else if !self.tag_others.is_empty()
                && !word.form.chars().next().is_some_and(char::is_alphanumeric)
            {
                self.log
                    .trace(format!("[{}] no alphanumeric char found, tag as {}", word.form, self.tag_others));
                word.set_analysis(vec![Analysis::new(word.form.clone(), self.tag_others.clone())]);
            }
        }
    }
}
