//! # Dicionário Morfológico
//!
//! Busca de análises `(lema, tag)` por forma, com preferências de ordenação,
//! decomposição de contrações (`del` → `de` + `el`) e análise de afixos para
//! formas derivadas.
//!
//! ```text
//! <IndexType>
//! DB_MAP
//! </IndexType>
//! <LemmaPreferences>
//! ser ir
//! </LemmaPreferences>
//! <PosPreferences>
//! VMIS3S0 VSIS3S0
//! </PosPreferences>
//! <Entries>
//! fue ir VMIS3S0 ser VSIS3S0
//! del de+el SPS00+DA0MS0
//! </Entries>
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::affixes::Affixes;
use crate::config_file::ConfigFile;
use crate::database::{Database, IndexType};
use crate::error::{read_model_file, PlnError, Result};
use crate::language::{apply_capitalization, capitalization, Analysis, Sentence, Word};
use crate::logging::Logger;

const TAG_DIVIDER: char = '|';

/// Busca de análises por forma. Usada pela análise de afixos.
pub trait FormLookup {
    fn search_form(&self, form: &str) -> Vec<Analysis>;
}

/// Opções de carga do dicionário.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DictionaryOptions {
    /// Mantém também o índice inverso `lema#tag` → formas.
    pub inverse_dict: bool,
    /// Substitui contrações por seus componentes na sentença.
    pub retok_contractions: bool,
}

impl Default for DictionaryOptions {
    fn default() -> Self {
        Self {
            inverse_dict: false,
            retok_contractions: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    IndexType,
    LemmaPreferences,
    PosPreferences,
    Entries,
}

#[derive(Debug)]
pub struct Dictionary {
    morfo: Database,
    inverse: Option<Database>,
    lemma_prefs: HashMap<String, String>,
    pos_prefs: HashMap<String, String>,
    options: DictionaryOptions,
    affixes: Option<Affixes>,
    log: Logger,
}

impl Dictionary {
    pub fn from_file(path: &Path, options: DictionaryOptions, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, options, log)
    }

    pub fn from_text(name: &str, text: &str, options: DictionaryOptions, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_section("IndexType", Section::IndexType)
            .with_section("LemmaPreferences", Section::LemmaPreferences)
            .with_section("PosPreferences", Section::PosPreferences)
            .with_section("Entries", Section::Entries);

        let mut dict = Self {
            morfo: Database::default(),
            inverse: None,
            lemma_prefs: HashMap::new(),
            pos_prefs: HashMap::new(),
            options,
            affixes: None,
            log: log.clone(),
        };
        let mut indexed = false;

        while let Some(line) = cfg.next_line()? {
            let items = line.fields();
            match line.section {
                Section::IndexType => {
                    let index = IndexType::parse(&line.text).ok_or_else(|| {
                        PlnError::config(name, line.line, format!("invalid IndexType '{}'", line.text))
                    })?;
                    dict.morfo = Database::new(index);
                    if options.inverse_dict {
                        dict.inverse = Some(Database::default());
                    }
                    indexed = true;
                }
                Section::LemmaPreferences | Section::PosPreferences => {
                    let [a, b, ..] = items.as_slice() else {
                        log.warn(format!("{name}:{}: incomplete preference '{}'", line.line, line.text));
                        continue;
                    };
                    let prefs = if line.section == Section::LemmaPreferences {
                        &mut dict.lemma_prefs
                    } else {
                        &mut dict.pos_prefs
                    };
                    prefs.entry(a.to_string()).or_insert_with(|| b.to_string());
                }
                Section::Entries => {
                    if !indexed {
                        return Err(PlnError::config(name, line.line, "no IndexType specified before entries"));
                    }
                    let Some((key, pairs)) = items.split_first() else {
                        continue;
                    };
                    if pairs.is_empty() || pairs.len() % 2 != 0 {
                        return Err(PlnError::config(
                            name,
                            line.line,
                            format!("invalid lemma-tag pairs in dictionary line '{}'", line.text),
                        ));
                    }
                    let lems = dict.parse_entry(pairs);
                    dict.morfo.add(key, &compact(&lems));
                    if let Some(inv) = dict.inverse.as_mut() {
                        for (lemma, tags) in &lems {
                            for tag in tags {
                                inv.add(&format!("{lemma}#{tag}"), key);
                            }
                        }
                    }
                }
            }
        }
        log.debug("dictionary created");
        Ok(dict)
    }

    /// Liga a análise de afixos.
    pub fn with_affixes(mut self, affixes: Affixes) -> Self {
        self.affixes = Some(affixes);
        self
    }

    pub fn options(&self) -> DictionaryOptions {
        self.options
    }

    /// `a` vem antes de `b`? Preferência explícita primeiro, senão ordem lexicográfica.
    fn prefers(pref: &HashMap<String, String>, a: &str, b: &str) -> bool {
        if pref.get(a).is_some_and(|p| p == b) {
            return true;
        }
        if pref.get(b).is_some_and(|p| p == a) {
            return false;
        }
        a < b
    }

    /// Ordenação por trocas: a relação de preferência não é uma ordem total,
    /// então não pode ir para `sort_by`.
    fn sort_with_prefs(items: &mut [String], pref: &HashMap<String, String>) {
        for i in 0..items.len() {
            for j in i + 1..items.len() {
                if Self::prefers(pref, &items[j], &items[i]) {
                    items.swap(i, j);
                }
            }
        }
    }

    /// Agrupa os pares por lema, ordenando lemas e tags pelas preferências.
    fn parse_entry(&self, pairs: &[&str]) -> Vec<(String, Vec<String>)> {
        let mut by_lemma: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for pair in pairs.chunks_exact(2) {
            by_lemma.entry(pair[0]).or_default().insert(pair[1]);
        }
        let mut lemmas: Vec<String> = by_lemma.keys().map(|l| l.to_string()).collect();
        Self::sort_with_prefs(&mut lemmas, &self.lemma_prefs);
        lemmas
            .into_iter()
            .map(|lemma| {
                let mut tags: Vec<String> = by_lemma
                    .get(lemma.as_str())
                    .map(|t| t.iter().map(|s| s.to_string()).collect())
                    .unwrap_or_default();
                Self::sort_with_prefs(&mut tags, &self.pos_prefs);
                (lemma, tags)
            })
            .collect()
    }

    /// Formas com o lema e a tag dados (requer `inverse_dict`).
    pub fn get_forms(&self, lemma: &str, tag: &str) -> Vec<String> {
        self.inverse
            .as_ref()
            .map(|db| {
                db.access(&format!("{lemma}#{tag}"))
                    .split_whitespace()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Expande tags com alternativas (`SPS00+DA0MS0/DA0FS0`) em todas as combinações.
    fn tag_combinations(tag: &str) -> Vec<String> {
        tag.split('+').fold(vec![String::new()], |acc, part| {
            acc.iter()
                .flat_map(|prefix| {
                    part.split('/').map(move |alt| {
                        if prefix.is_empty() {
                            alt.to_string()
                        } else {
                            format!("{prefix}+{alt}")
                        }
                    })
                })
                .collect()
        })
    }

    /// Componentes da contração `(lemma, tag)` de `form`, ou `None` se a análise não é contração.
    pub fn check_contracted(&self, form: &str, lemma: &str, tag: &str) -> Result<Option<Vec<Word>>> {
        if !lemma.contains('+') || !tag.contains('+') {
            return Ok(None);
        }
        self.log.trace(format!("checking contracted word {form}"));
        let caps = capitalization(form);
        let mut components = vec![];
        for (cl, ct) in lemma.split('+').zip(tag.split('+')) {
            let alternatives: Vec<&str> = ct.split('/').collect();
            let mut c = Word::new(apply_capitalization(cl, caps, components.is_empty()));
            for a in self.search_form(cl) {
                if alternatives.iter().any(|t| *t == "*" || a.tag.starts_with(t)) {
                    self.log.trace(format!("   matching analysis: {}", a.tag));
                    c.add_analysis(a);
                }
            }
            if c.n_analyses() == 0 {
                return Err(PlnError::MissingComponent {
                    form: cl.to_string(),
                    tag: ct.to_string(),
                });
            }
            components.push(c);
        }
        Ok(Some(components))
    }

    /// Anota a palavra com as análises do dicionário e dos afixos. Devolve os
    /// componentes quando a palavra é uma contração a ser retokenizada.
    pub fn annotate_word(&self, word: &mut Word, override_retok: bool) -> Result<Option<Vec<Word>>> {
        let found = self.search_form(&word.form);
        word.in_dict = !found.is_empty();
        self.log
            .trace(format!("found {} analyses for {}", found.len(), word.form));
        for a in found {
            word.add_analysis(a);
        }

        if let Some(affixes) = &self.affixes {
            affixes.look_for_affixes(word, self);
        }

        if !self.options.retok_contractions || override_retok {
            let mut expanded = vec![];
            for a in std::mem::take(&mut word.analyses) {
                for tag in Self::tag_combinations(&a.tag) {
                    expanded.push(Analysis { tag, ..a.clone() });
                }
            }
            word.analyses = expanded;
            for i in 0..word.analyses.len() {
                let (lemma, tag) = (word.analyses[i].lemma.clone(), word.analyses[i].tag.clone());
                if let Some(retok) = self.check_contracted(&word.form, &lemma, &tag)? {
                    word.analyses[i].retok = retok;
                }
            }
            return Ok(None);
        }

        let contracted = word
            .analyses
            .iter()
            .position(|a| a.lemma.contains('+') && a.tag.contains('+'));
        let chosen = match contracted {
            Some(i) => {
                if word.n_analyses() > 1 {
                    let a = &word.analyses[i];
                    self.log.warn(format!(
                        "contraction {} has several analyses in dictionary, all ignored except ({},{})",
                        word.form, a.lemma, a.tag
                    ));
                }
                Some(i)
            }
            None => None,
        };
        match chosen.map(|i| &word.analyses[i]) {
            Some(a) => self.check_contracted(&word.form, &a.lemma, &a.tag),
            None => Ok(None),
        }
    }

    /// Anota as palavras sem análise (e números) e substitui contrações por seus componentes.
    pub fn analyze(&self, sentence: &mut Sentence) -> Result<()> {
        // contrações só substituem as palavras depois que a sentença inteira foi anotada
        let mut splits = vec![];
        for (i, word) in sentence.words.iter_mut().enumerate() {
            let annotate = word.n_analyses() == 0 || word.tag(0).starts_with('Z');
            if !annotate {
                continue;
            }
            if let Some(components) = self.annotate_word(word, false)? {
                self.log.trace(format!(
                    "contraction found, replacing {} span=({},{})",
                    word.form, word.start, word.finish
                ));
                splits.push((i, distribute_span(components, word.start, word.finish)));
            }
        }
        if splits.is_empty() {
            return Ok(());
        }
        for (i, components) in splits.into_iter().rev() {
            sentence.words.splice(i..=i, components);
        }
        sentence.rebuild_word_index();
        Ok(())
    }
}

impl FormLookup for Dictionary {
    /// Análises da forma (em minúsculas), na ordem de preferência do arquivo.
    fn search_form(&self, form: &str) -> Vec<Analysis> {
        let data = self.morfo.access(&form.to_lowercase());
        let items: Vec<&str> = data.split_whitespace().collect();
        items
            .chunks_exact(2)
            .flat_map(|pair| {
                pair[1]
                    .split(TAG_DIVIDER)
                    .map(move |tag| Analysis::new(pair[0], tag))
            })
            .collect()
    }
}

/// `lema tag|tag lema2 tag ...`.
fn compact(lems: &[(String, Vec<String>)]) -> String {
    lems.iter()
        .map(|(lemma, tags)| format!("{lemma} {}", tags.join("|")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reparte o span da contração entre os componentes.
pub(crate) fn distribute_span(mut components: Vec<Word>, start: usize, finish: usize) -> Vec<Word> {
    let n = components.len().max(1) as f64;
    let step = ((finish as f64 - start as f64 + 1.0) / n).max(1.0);
    let len = (step - 1.0).max(1.0);
    let last = components.len().saturating_sub(1);
    let mut st = start as f64;
    for (i, c) in components.iter_mut().enumerate() {
        let s = st as usize;
        let f = if i == last { finish } else { s + len as usize };
        c.start = s;
        c.finish = f;
        st += step.floor();
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use std::sync::Arc;

    const DICT: &str = "<IndexType>\nDB_MAP\n</IndexType>\n\
<LemmaPreferences>\nser ir\n</LemmaPreferences>\n\
<PosPreferences>\nVSIS3S0 VMIS3S0\n</PosPreferences>\n\
<Entries>\n\
fue ir VMIS3S0 ser VSIS3S0\n\
casa casa NCFS000 casar VMIP3S0 casar VMM02S0\n\
del de+el SPS00+DA0MS0\n\
de de SPS00\n\
el el DA0MS0\n\
al a+el SPS00+DA0MS0 al NP00000\n\
a a SPS00\n\
1 1 Z\n\
</Entries>\n";

    fn dict(options: DictionaryOptions) -> Dictionary {
        Dictionary::from_text("dicc.src", DICT, options, Logger::null()).unwrap()
    }

    fn pairs(v: &[Analysis]) -> Vec<(&str, &str)> {
        v.iter().map(|a| (a.lemma.as_str(), a.tag.as_str())).collect()
    }

    #[test]
    fn test_search_form_applies_preferences() {
        let d = dict(DictionaryOptions::default());
        assert_eq!(pairs(&d.search_form("Fue")), vec![("ser", "VSIS3S0"), ("ir", "VMIS3S0")]);
        assert_eq!(
            pairs(&d.search_form("casa")),
            vec![("casa", "NCFS000"), ("casar", "VMIP3S0"), ("casar", "VMM02S0")]
        );
        assert!(d.search_form("nada").is_empty());
    }

    #[test]
    fn test_contraction_is_retokenized() {
        let d = dict(DictionaryOptions::default());
        let mut s = Sentence::from_words(vec![
            Word::new("Del").with_span(0, 3),
            Word::new("fue").with_span(4, 7),
        ]);
        d.analyze(&mut s).unwrap();
        let forms: Vec<&str> = s.words.iter().map(|w| w.form.as_str()).collect();
        assert_eq!(forms, vec!["De", "el", "fue"]);
        assert_eq!(s.words[0].tag(0), "SPS00");
        assert_eq!(s.words[1].tag(0), "DA0MS0");
        assert_eq!((s.words[0].start, s.words[0].finish), (0, 1));
        assert_eq!((s.words[1].start, s.words[1].finish), (2, 3));
        assert_eq!(s.words[2].position, 2);
    }

    #[test]
    fn test_ambiguous_contraction_warns() {
        let sink = MemorySink::new();
        let d = Dictionary::from_text(
            "dicc.src",
            DICT,
            DictionaryOptions::default(),
            Logger::new("dictionary", Arc::new(sink.clone())),
        )
        .unwrap();
        let mut w = Word::new("al");
        let comps = d.annotate_word(&mut w, false).unwrap().unwrap();
        assert_eq!(comps.len(), 2);
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_contraction_kept_with_retok_list() {
        let d = dict(DictionaryOptions {
            retok_contractions: false,
            ..Default::default()
        });
        let mut s = Sentence::from_words(vec![Word::new("del")]);
        d.analyze(&mut s).unwrap();
        assert_eq!(s.len(), 1);
        assert!(s.words[0].has_retokenizable());
        assert_eq!(s.words[0].analyses[0].retok.len(), 2);
    }

    #[test]
    fn test_missing_component_is_error() {
        let text = "<IndexType>\nDB_MAP\n</IndexType>\n<Entries>\nxy x+y A+B\nx x A\n</Entries>\n";
        let d = Dictionary::from_text("d", text, DictionaryOptions::default(), Logger::null()).unwrap();
        let mut s = Sentence::from_words(vec![Word::new("x"), Word::new("xy"), Word::new("x")]);
        assert!(matches!(d.analyze(&mut s), Err(PlnError::MissingComponent { .. })));
        let forms: Vec<&str> = s.words.iter().map(|w| w.form.as_str()).collect();
        assert_eq!(forms, vec!["x", "xy", "x"]);
    }

    #[test]
    fn test_unknown_and_locked_words() {
        let d = dict(DictionaryOptions::default());
        let mut punct = Word::new(".");
        punct.set_analysis(vec![Analysis::new(".", "Fp")]);
        punct.lock();
        let mut s = Sentence::from_words(vec![Word::new("xyzzy"), punct, Word::new("1")]);
        s.words[2].set_analysis(vec![Analysis::new("1", "Z")]);
        d.analyze(&mut s).unwrap();
        assert!(!s.words[0].in_dict);
        assert_eq!(s.words[1].n_analyses(), 1);
        assert_eq!(s.words[2].n_analyses(), 2);
    }

    #[test]
    fn test_inverse_dictionary() {
        let d = dict(DictionaryOptions {
            inverse_dict: true,
            ..Default::default()
        });
        assert_eq!(d.get_forms("casar", "VMIP3S0"), vec!["casa"]);
    }

    #[test]
    fn test_tag_combinations() {
        assert_eq!(
            Dictionary::tag_combinations("SPS00+DA0MS0/DA0FS0"),
            vec!["SPS00+DA0MS0", "SPS00+DA0FS0"]
        );
    }

    #[test]
    fn test_entries_need_index_type() {
        let text = "<Entries>\ncasa casa NCFS000\n</Entries>\n";
        assert!(Dictionary::from_text("d", text, DictionaryOptions::default(), Logger::null()).is_err());
    }
}
