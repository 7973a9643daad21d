//! # Análise Morfológica (Maco)
//!
//! Orquestra, por sentença e nesta ordem: pontuação → dicionário (com afixos e
//! contrações) → locuções → nomes próprios → probabilidades. Cada estágio só roda
//! se o modelo correspondente foi configurado.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::affixes::Affixes;
use crate::dictionary::{Dictionary, DictionaryOptions};
use crate::error::Result;
use crate::language::Sentence;
use crate::locutions::Locutions;
use crate::logging::Logger;
use crate::ner::NpRecognizer;
use crate::probability::{Probability, DEFAULT_THRESHOLD};
use crate::punts::Punts;

/// Arquivos e parâmetros da análise morfológica. Nomes vazios desligam o estágio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacoOptions {
    pub punctuation_file: Option<String>,
    pub dictionary_file: Option<String>,
    pub affix_file: Option<String>,
    pub locutions_file: Option<String>,
    pub np_file: Option<String>,
    pub probability_file: Option<String>,
    pub probability_threshold: f64,
    pub retok_contractions: bool,
    pub inverse_dict: bool,
}

impl Default for MacoOptions {
    fn default() -> Self {
        Self {
            punctuation_file: None,
            dictionary_file: None,
            affix_file: None,
            locutions_file: None,
            np_file: None,
            probability_file: None,
            probability_threshold: DEFAULT_THRESHOLD,
            retok_contractions: true,
            inverse_dict: false,
        }
    }
}

impl MacoOptions {
    pub fn dictionary_options(&self) -> DictionaryOptions {
        DictionaryOptions {
            inverse_dict: self.inverse_dict,
            retok_contractions: self.retok_contractions,
        }
    }
}

#[derive(Debug, Default)]
pub struct Maco {
    punts: Option<Punts>,
    dictionary: Option<Dictionary>,
    locutions: Option<Locutions>,
    ner: Option<NpRecognizer>,
    probability: Option<Probability>,
}

impl Maco {
    /// Carrega os módulos configurados. `resolve` transforma um nome de arquivo
    /// das opções num caminho.
    pub fn new(options: &MacoOptions, lang: &str, resolve: impl Fn(&str) -> PathBuf, log: &Logger) -> Result<Self> {
        let path = |name: &Option<String>| name.as_deref().filter(|n| !n.is_empty()).map(&resolve);
        let mut maco = Maco::default();

        if let Some(p) = path(&options.punctuation_file) {
            maco.punts = Some(Punts::from_file(&p, log.for_module("punts"))?);
        }
        if let Some(p) = path(&options.dictionary_file) {
            let mut dict = Dictionary::from_file(&p, options.dictionary_options(), log.for_module("dictionary"))?;
            if let Some(a) = path(&options.affix_file) {
                dict = dict.with_affixes(Affixes::from_file(&a, lang, log.for_module("affixes"))?);
            }
            maco.dictionary = Some(dict);
        }
        if let Some(p) = path(&options.locutions_file) {
            maco.locutions = Some(Locutions::from_file(&p, log.for_module("locutions"))?);
        }
        if let Some(p) = path(&options.np_file) {
            maco.ner = Some(NpRecognizer::from_file(&p, log.for_module("ner"))?);
        }
        if let Some(p) = path(&options.probability_file) {
            maco.probability = Some(Probability::from_file(
                &p,
                options.probability_threshold,
                log.for_module("probability"),
            )?);
        }

        log.info(format!("morphological analyzer ready: {}", maco.stages().join(", ")));
        Ok(maco)
    }

    /// Variante com os caminhos já resolvidos relativos a `dir`.
    pub fn from_dir(options: &MacoOptions, lang: &str, dir: &Path, log: &Logger) -> Result<Self> {
        Self::new(options, lang, |name| dir.join(name), log)
    }

    pub fn with_punts(mut self, punts: Punts) -> Self {
        self.punts = Some(punts);
        self
    }

    pub fn with_dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn with_locutions(mut self, locutions: Locutions) -> Self {
        self.locutions = Some(locutions);
        self
    }

    pub fn with_ner(mut self, ner: NpRecognizer) -> Self {
        self.ner = Some(ner);
        self
    }

    pub fn with_probability(mut self, probability: Probability) -> Self {
        self.probability = Some(probability);
        self
    }

    /// Nomes dos estágios ativos.
    pub fn stages(&self) -> Vec<&'static str> {
        [
            (self.punts.is_some(), "punctuation"),
            (self.dictionary.is_some(), "dictionary"),
            (self.locutions.is_some(), "locutions"),
            (self.ner.is_some(), "ner"),
            (self.probability.is_some(), "probability"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }

    pub fn analyze(&self, sentence: &mut Sentence) -> Result<()> {
        if let Some(p) = &self.punts {
            p.analyze(sentence);
        }
        if let Some(d) = &self.dictionary {
            d.analyze(sentence)?;
        }
        if let Some(l) = &self.locutions {
            l.analyze(sentence);
        }
        if let Some(n) = &self.ner {
            n.analyze(sentence);
        }
        if let Some(p) = &self.probability {
            p.analyze(sentence);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Word;

    const DICT: &str = "<IndexType>\nDB_MAP\n</IndexType>\n<Entries>\njohn john NP\nsmith smith NP\n\
went go VBD\nto to TO\nparis paris NP\n</Entries>\n";
    const PUNTS: &str = "DB_MAP\n. . Fp\n<Other> Fz\n";

    fn sentence(forms: &[&str]) -> Sentence {
        Sentence::from_words(forms.iter().map(|f| Word::new(*f)).collect())
    }

    fn base() -> Maco {
        Maco::default()
            .with_punts(Punts::from_text(PUNTS, Logger::null()))
            .with_dictionary(Dictionary::from_text("dicc.src", DICT, DictionaryOptions::default(), Logger::null()).unwrap())
    }

    #[test]
    fn test_stages_run_in_order() {
        let loc = Locutions::from_text(
            "locucions.dat",
            "<Multiwords>\njohn_smith john_smith NP\n</Multiwords>\n",
            Logger::null(),
        )
        .unwrap();
        let maco = base().with_locutions(loc);
        assert_eq!(maco.stages(), vec!["punctuation", "dictionary", "locutions"]);

        let mut s = sentence(&["John", "Smith", "went", "to", "Paris", "."]);
        maco.analyze(&mut s).unwrap();
        let tags: Vec<(&str, &str)> = s.words.iter().map(|w| (w.form.as_str(), w.tag(0))).collect();
        assert_eq!(
            tags,
            vec![("John_Smith", "NP"), ("went", "VBD"), ("to", "TO"), ("Paris", "NP"), (".", "Fp")]
        );
    }

    #[test]
    fn test_without_locutions_words_stay_apart() {
        let mut s = sentence(&["John", "Smith", "went"]);
        base().analyze(&mut s).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.words[1].tag(0), "NP");
    }

    #[test]
    fn test_options_from_json() {
        let opts: MacoOptions = serde_json::from_str(r#"{"dictionary_file": "dicc.src"}"#).unwrap();
        assert_eq!(opts.dictionary_file.as_deref(), Some("dicc.src"));
        assert!(opts.retok_contractions);
        assert_eq!(opts.probability_threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_loads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dicc.src"), DICT).unwrap();
        std::fs::write(dir.path().join("punct.dat"), PUNTS).unwrap();
        let opts = MacoOptions {
            dictionary_file: Some("dicc.src".into()),
            punctuation_file: Some("punct.dat".into()),
            locutions_file: Some(String::new()),
            ..MacoOptions::default()
        };
        let maco = Maco::from_dir(&opts, "en", dir.path(), &Logger::null()).unwrap();
        assert_eq!(maco.stages(), vec!["punctuation", "dictionary"]);
    }
}
