//! # Base Semântica (WordNet)
//!
//! Liga palavras a synsets. O arquivo de configuração aponta para os dados:
//!
//! ```text
//! <WNposMap>
//! N n L
//! V v L
//! A a VMP00SM
//! </WNposMap>
//! <DataFiles>
//! senseDictFile ./senses30.src
//! wnFile ../common/wn30.src
//! formDictFile ./dicc.src
//! </DataFiles>
//! ```
//!
//! Na terceira coluna do `WNposMap`, `L` usa o lema e `F` a forma. Qualquer outro
//! valor é uma tag: o lema é procurado no dicionário de formas com essa tag
//! (ex: particípios procurados como adjetivos).

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config_file::{relative_to, ConfigFile};
use crate::database::Database;
use crate::error::{read_model_file, Result};
use crate::logging::Logger;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    PosMap,
    DataFiles,
}

#[derive(Debug, Clone, PartialEq)]
struct PosMapRule {
    pos: String,
    wnpos: String,
    lemma: String,
}

/// Arquivos de dados referenciados na seção `<DataFiles>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFiles {
    pub form_dict: Option<String>,
    pub sense_dict: Option<String>,
    pub wn: Option<String>,
}

/// Informação de um synset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SenseInfo {
    pub sense: String,
    pub parents: Vec<String>,
    pub sem_file: String,
    pub words: Vec<String>,
    pub tonto: Vec<String>,
    pub sumo: String,
    pub cyc: String,
}

impl SenseInfo {
    /// Interpreta `parents semfile tonto sumo cyc` (`-` = vazio).
    fn parse(sense: &str, data: &str) -> Self {
        let mut info = SenseInfo {
            sense: sense.to_string(),
            ..Default::default()
        };
        let fields: Vec<&str> = data.split_whitespace().collect();
        let get = |i: usize| fields.get(i).copied().filter(|f| !f.starts_with('-'));
        let list = |f: Option<&str>| f.map(|s| s.split(':').map(str::to_string).collect()).unwrap_or_default();
        info.parents = list(get(0));
        info.sem_file = fields.get(1).map(|s| s.to_string()).unwrap_or_default();
        info.tonto = list(get(2));
        info.sumo = get(3).unwrap_or("").to_string();
        info.cyc = get(4).unwrap_or("").to_string();
        info
    }

    pub fn parents_string(&self) -> String {
        self.parents.join(":")
    }
}

#[derive(Debug, Clone)]
pub struct SemanticDb {
    pos_map: Vec<PosMapRule>,
    form_dict: Option<Database>,
    sense_db: Database,
    wndb: Option<Database>,
    log: Logger,
}

impl SemanticDb {
    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        let config = read_model_file(path)?;
        let (_, files) = Self::parse_config(&path.display().to_string(), &config, &log)?;
        let load = |f: &Option<String>| -> Result<Option<String>> {
            f.as_deref()
                .map(|name| read_model_file(relative_to(path, name)))
                .transpose()
        };
        Self::from_texts(
            &path.display().to_string(),
            &config,
            load(&files.form_dict)?.as_deref(),
            load(&files.sense_dict)?.as_deref(),
            load(&files.wn)?.as_deref(),
            log,
        )
    }

    /// Monta a base com os conteúdos dos arquivos já carregados.
    pub fn from_texts(
        name: &str,
        config: &str,
        form_dict: Option<&str>,
        sense_dict: Option<&str>,
        wn: Option<&str>,
        log: Logger,
    ) -> Result<Self> {
        let (pos_map, _) = Self::parse_config(name, config, &log)?;

        let special_tags: HashSet<&str> = pos_map
            .iter()
            .map(|r| r.lemma.as_str())
            .filter(|l| *l != "L" && *l != "F")
            .collect();

        let form_dict = form_dict.filter(|_| !special_tags.is_empty()).map(|text| {
            let mut db = Database::default();
            for line in text.lines() {
                let items: Vec<&str> = line.split_whitespace().collect();
                let Some((form, pairs)) = items.split_first() else {
                    continue;
                };
                for pair in pairs.chunks_exact(2) {
                    if special_tags.contains(pair[1]) {
                        db.add(&format!("{} {}", pair[0], pair[1]), form);
                    }
                }
            }
            db
        });

        let mut sense_db = Database::default();
        for line in sense_dict.unwrap_or("").lines() {
            let mut items = line.split_whitespace();
            let Some(sense) = items.next() else {
                continue;
            };
            let pos = sense.split_once('-').map(|(_, p)| p).unwrap_or("");
            for word in items {
                sense_db.add(&format!("S:{sense}"), word);
                sense_db.add(&format!("W:{word}:{pos}"), sense);
            }
        }

        let wndb = wn.map(Database::from_text);
        log.debug("semantic database loaded");
        Ok(Self {
            pos_map,
            form_dict,
            sense_db,
            wndb,
            log,
        })
    }

    fn parse_config(name: &str, text: &str, log: &Logger) -> Result<(Vec<PosMapRule>, DataFiles)> {
        let mut cfg = ConfigFile::from_text(name, text, true, log.clone())
            .with_section("WNposMap", Section::PosMap)
            .with_section("DataFiles", Section::DataFiles);
        let mut rules = vec![];
        let mut files = DataFiles::default();
        while let Some(line) = cfg.next_line()? {
            let items = line.fields();
            match (line.section, items.as_slice()) {
                (Section::PosMap, [pos, wnpos, lemma, ..]) => rules.push(PosMapRule {
                    pos: pos.to_string(),
                    wnpos: wnpos.to_string(),
                    lemma: lemma.to_string(),
                }),
                (Section::DataFiles, [key, fname, ..]) => {
                    let slot = match *key {
                        "formDictFile" => &mut files.form_dict,
                        "senseDictFile" => &mut files.sense_dict,
                        "wnFile" => &mut files.wn,
                        _ => continue,
                    };
                    *slot = Some(fname.to_string());
                }
                _ => log.warn(format!("{name}:{}: ignoring malformed line '{}'", line.line, line.text)),
            }
        }
        Ok((rules, files))
    }

    /// Pares (palavra, pos WordNet) a procurar para a análise `(lemma, tag)` de `form`.
    pub fn wn_keys(&self, form: &str, lemma: &str, tag: &str) -> Vec<(String, String)> {
        let mut keys = vec![];
        for rule in self.pos_map.iter().filter(|r| tag.starts_with(&r.pos)) {
            let words = match rule.lemma.as_str() {
                "L" => lemma.to_string(),
                "F" => form.to_string(),
                special => self
                    .form_dict
                    .as_ref()
                    .map(|db| db.access(&format!("{lemma} {special}")).to_string())
                    .unwrap_or_default(),
            };
            for w in words.split_whitespace() {
                self.log
                    .trace(format!("searching '{form}' as {w} with pos {}", rule.wnpos));
                keys.push((w.to_string(), rule.wnpos.clone()));
            }
        }
        keys
    }

    /// Synsets candidatos da análise, na ordem do arquivo de sentidos.
    pub fn word_senses(&self, form: &str, lemma: &str, tag: &str) -> Vec<String> {
        self.wn_keys(form, lemma, tag)
            .iter()
            .flat_map(|(w, pos)| {
                self.sense_db
                    .access(&format!("W:{w}:{pos}"))
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Palavras do synset.
    pub fn sense_words(&self, sense: &str) -> Vec<String> {
        self.sense_db
            .access(&format!("S:{sense}"))
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    pub fn sense_info(&self, sense: &str) -> SenseInfo {
        let data = self.wndb.as_ref().map(|db| db.access(sense)).unwrap_or("");
        let mut info = SenseInfo::parse(sense, data);
        info.words = self.sense_words(sense);
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "<WNposMap>\nN n L\nV v L\nA a VMP00SM\n</WNposMap>\n<DataFiles>\nsenseDictFile ./senses.src\n</DataFiles>\n";
    const SENSES: &str = "02084071-n dog domestic_dog\n01047745-v dog chase\n00001740-a able\n";
    const FORMS: &str = "cansado cansar VMP00SM\n";
    const WN: &str = "DB_MAP\n02084071-n 02083346-n:01317541-n 05 Animal+Living - -\n";

    fn db() -> SemanticDb {
        SemanticDb::from_texts("senses.dat", CONFIG, Some(FORMS), Some(SENSES), Some(WN), Logger::null()).unwrap()
    }

    #[test]
    fn test_word_senses_by_lemma_and_pos() {
        let db = db();
        assert_eq!(db.word_senses("dogs", "dog", "NNS"), vec!["02084071-n"]);
        assert_eq!(db.word_senses("dogged", "dog", "VBD"), vec!["01047745-v"]);
        assert!(db.word_senses("the", "the", "DT").is_empty());
    }

    #[test]
    fn test_special_pos_map_uses_form_dictionary() {
        let db = db();
        assert_eq!(
            db.wn_keys("cansado", "cansar", "AQ0MS0"),
            vec![("cansado".to_string(), "a".to_string())]
        );
    }

    #[test]
    fn test_sense_info_fields() {
        let info = db().sense_info("02084071-n");
        assert_eq!(info.parents, vec!["02083346-n", "01317541-n"]);
        assert_eq!(info.sem_file, "05");
        assert_eq!(info.words, vec!["dog", "domestic_dog"]);
        assert!(info.sumo.is_empty());
    }

    #[test]
    fn test_from_file_resolves_data_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("senses.src"), SENSES).unwrap();
        let cfg = dir.path().join("senses.dat");
        std::fs::write(&cfg, CONFIG).unwrap();
        let db = SemanticDb::from_file(&cfg, Logger::null()).unwrap();
        assert_eq!(db.sense_words("01047745-v"), vec!["dog", "chase"]);
    }
}
