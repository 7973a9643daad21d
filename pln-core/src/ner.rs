//! # Reconhecimento de Nomes Próprios
//!
//! Detector simples ("basic") de entidades nomeadas: agrupa sequências de
//! palavras capitalizadas, ligadas opcionalmente por palavras funcionais
//! (`Banco de España`) e cercadas por prefixos/sufixos configurados, numa
//! multipalavra com a tag de entidade.
//!
//! Estados: `In` (inicial), `Np`, `Fun`, `Pref`, `Suf` e `Stop`; `Np` e `Suf`
//! são finais.
//!
//! ```text
//! <Type>
//! basic
//! </Type>
//! <NE_Tag>
//! NP00000
//! </NE_Tag>
//! <FunctionWords>
//! de
//! del
//! </FunctionWords>
//! <SpecialPunct>
//! Fe
//! </SpecialPunct>
//! <Ignore>
//! NP00G00 1
//! ii 0
//! </Ignore>
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use regex::Regex;

use crate::automaton::{self, Automaton};
use crate::config_file::ConfigFile;
use crate::error::{read_model_file, PlnError, Result};
use crate::language::{has_lowercase, is_all_caps, starts_upper, Analysis, Sentence, Word};
use crate::logging::Logger;

const DEFAULT_NE_TAG: &str = "NP00000";
const RE_NOUN_ADJ: &str = "^(NC|AQ)";
const RE_CLOSED: &str = "^[DSC]";
const RE_DATE_NUM_PUNCT: &str = "^[FWZ]";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Type,
    NeTag,
    TitleLimit,
    AllCapsTitleLimit,
    SplitMultiwords,
    FunctionWords,
    SpecialPunct,
    Names,
    Ignore,
    NounAdj,
    Closed,
    DateNumPunct,
    Affixes,
}

/// Como tratar uma palavra listada em `<Ignore>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ignore {
    /// Tipo 0: conta como capitalizada se estiver dentro (ou antes) de um nome.
    AsCapitalized,
    /// Tipo 1: nunca faz parte de um nome.
    Completely,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpState {
    In,
    Np,
    Fun,
    Pref,
    Suf,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpToken {
    /// Início de sentença, capitalizada e desconhecida.
    SUnkUpp,
    /// Início de sentença, capitalizada e nome/adjetivo.
    SNounUpp,
    MUpper,
    MFun,
    MPref,
    MSuf,
    Other,
}

#[derive(Debug, Default)]
pub struct NpScan {
    initial_noun: bool,
}

#[derive(Debug)]
pub struct NpRecognizer {
    ne_tag: String,
    title_limit: usize,
    all_caps_title_limit: usize,
    split_multiwords: bool,
    function_words: HashSet<String>,
    punct: HashSet<String>,
    names: HashSet<String>,
    ignore_tags: HashMap<String, Ignore>,
    ignore_words: HashMap<String, Ignore>,
    prefixes: HashSet<String>,
    suffixes: HashSet<String>,
    noun_adj: Regex,
    closed: Regex,
    date_num_punct: Regex,
    log: Logger,
}

impl NpRecognizer {
    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, log)
    }

    pub fn from_text(name: &str, text: &str, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, true, log.clone())
            .with_section("Type", Section::Type)
            .with_section("NE_Tag", Section::NeTag)
            .with_section("TitleLimit", Section::TitleLimit)
            .with_section("AllCapsTitleLimit", Section::AllCapsTitleLimit)
            .with_section("SplitMultiwords", Section::SplitMultiwords)
            .with_section("FunctionWords", Section::FunctionWords)
            .with_section("SpecialPunct", Section::SpecialPunct)
            .with_section("Names", Section::Names)
            .with_section("Ignore", Section::Ignore)
            .with_section("RE_NounAdj", Section::NounAdj)
            .with_section("RE_Closed", Section::Closed)
            .with_section("RE_DateNumPunct", Section::DateNumPunct)
            .with_section("Affixes", Section::Affixes);

        let mut ner = Self {
            ne_tag: DEFAULT_NE_TAG.to_string(),
            title_limit: 0,
            all_caps_title_limit: 0,
            split_multiwords: false,
            function_words: HashSet::new(),
            punct: HashSet::new(),
            names: HashSet::new(),
            ignore_tags: HashMap::new(),
            ignore_words: HashMap::new(),
            prefixes: HashSet::new(),
            suffixes: HashSet::new(),
            noun_adj: Regex::new(RE_NOUN_ADJ)?,
            closed: Regex::new(RE_CLOSED)?,
            date_num_punct: Regex::new(RE_DATE_NUM_PUNCT)?,
            log: log.clone(),
        };

        while let Some(line) = cfg.next_line()? {
            let text = line.text.trim();
            let items = line.fields();
            let limit = |t: &str| {
                t.parse::<usize>()
                    .map_err(|_| PlnError::config(name, line.line, format!("invalid limit '{t}'")))
            };
            match line.section {
                Section::Type => {
                    if !text.eq_ignore_ascii_case("basic") {
                        return Err(PlnError::config(
                            name,
                            line.line,
                            format!("invalid configuration file for 'basic' NER: type '{text}'"),
                        ));
                    }
                }
                Section::NeTag => ner.ne_tag = text.to_string(),
                Section::TitleLimit => ner.title_limit = limit(text)?,
                Section::AllCapsTitleLimit => ner.all_caps_title_limit = limit(text)?,
                Section::SplitMultiwords => ner.split_multiwords = matches!(text, "yes" | "true" | "1"),
                Section::FunctionWords => {
                    ner.function_words.insert(text.to_string());
                }
                Section::SpecialPunct => {
                    ner.punct.insert(text.to_string());
                }
                Section::Names => {
                    ner.names.insert(text.to_string());
                }
                Section::Ignore => {
                    let [key, kind, ..] = items.as_slice() else {
                        log.warn(format!("{name}:{}: incomplete ignore entry '{text}'", line.line));
                        continue;
                    };
                    let kind = if *kind == "1" { Ignore::Completely } else { Ignore::AsCapitalized };
                    if starts_upper(key) {
                        ner.ignore_tags.insert(key.to_string(), kind);
                    } else {
                        ner.ignore_words.insert(key.to_string(), kind);
                    }
                }
                Section::NounAdj => ner.noun_adj = Regex::new(text)?,
                Section::Closed => ner.closed = Regex::new(text)?,
                Section::DateNumPunct => ner.date_num_punct = Regex::new(text)?,
                Section::Affixes => match items.as_slice() {
                    [word, "SUF", ..] => {
                        ner.suffixes.insert(word.to_string());
                    }
                    [word, "PRE", ..] => {
                        ner.prefixes.insert(word.to_string());
                    }
                    _ => log.warn(format!("ignored affix with unknown type in '{text}'")),
                },
            }
        }

        log.debug("NP recognizer loaded");
        Ok(ner)
    }

    pub fn ne_tag(&self) -> &str {
        &self.ne_tag
    }

    pub fn analyze(&self, sentence: &mut Sentence) {
        if automaton::scan(self, sentence) {
            self.log.trace("named entities built");
        }
    }

    fn ignore_kind(&self, word: &Word) -> Option<Ignore> {
        self.ignore_words
            .get(&word.lc_form)
            .or_else(|| word.analyses.iter().find_map(|a| self.ignore_tags.get(&a.tag)))
            .copied()
    }

    /// Um nome longo demais sem minúsculas (título) é rejeitado.
    fn valid_span(&self, words: &[Word]) -> bool {
        let n = words.len();
        if self.title_limit > 0 && n >= self.title_limit && words.iter().all(|w| starts_upper(&w.form)) {
            self.log.trace("rejected: title-like span");
            return false;
        }
        if self.all_caps_title_limit > 0 && n >= self.all_caps_title_limit && !words.iter().any(|w| has_lowercase(&w.form)) {
            self.log.trace("rejected: all-caps span");
            return false;
        }
        true
    }
}

impl Automaton for NpRecognizer {
    type State = NpState;
    type Token = NpToken;
    type ScanState = NpScan;

    fn initial_state(&self) -> NpState {
        NpState::In
    }

    fn is_stop(&self, state: NpState) -> bool {
        state == NpState::Stop
    }

    fn is_final(&self, state: NpState) -> bool {
        matches!(state, NpState::Np | NpState::Suf)
    }

    fn transition(&self, state: NpState, token: NpToken) -> NpState {
        use NpState::*;
        use NpToken::*;
        match (state, token) {
            (In, SUnkUpp | SNounUpp | MUpper) => Np,
            (In, MPref) => Pref,
            (Pref, MPref) => Pref,
            (Pref, MUpper) => Np,
            (Np, MUpper) => Np,
            (Np, MFun) => Fun,
            (Np, MSuf) => Suf,
            (Fun, MUpper) => Np,
            (Fun, MFun) => Fun,
            (Suf, MSuf) => Suf,
            _ => Stop,
        }
    }

    fn compute_token(&self, state: NpState, words: &mut [Word], idx: usize, _scan: &mut NpScan) -> NpToken {
        let word = &words[idx];
        let sbegin = idx == 0 || words[idx - 1].analyses.iter().any(|a| self.punct.contains(&a.tag));

        match self.ignore_kind(word) {
            Some(Ignore::AsCapitalized) => {
                if state == NpState::Np {
                    NpToken::MUpper
                } else if words.get(idx + 1).is_some_and(|next| starts_upper(&next.form)) {
                    if sbegin {
                        NpToken::SNounUpp
                    } else {
                        NpToken::MUpper
                    }
                } else {
                    NpToken::Other
                }
            }
            Some(Ignore::Completely) => NpToken::Other,
            None if sbegin => {
                if word.form.chars().count() > 1 && is_all_caps(&word.form) {
                    NpToken::SNounUpp
                } else if !word.locked
                    && starts_upper(&word.form)
                    && !self.function_words.contains(&word.lc_form)
                    && !word.is_multiword()
                    && !word.find_tag_match(&self.date_num_punct)
                {
                    if word.analyses.is_empty() {
                        NpToken::SUnkUpp
                    } else if !word.find_tag_match(&self.closed)
                        && (word.find_tag_match(&self.noun_adj) || self.names.contains(&word.lc_form))
                    {
                        NpToken::SNounUpp
                    } else {
                        NpToken::Other
                    }
                } else {
                    NpToken::Other
                }
            }
            None if !word.locked => {
                if starts_upper(&word.form) && !word.find_tag_match(&self.date_num_punct) {
                    NpToken::MUpper
                } else if self.function_words.contains(&word.lc_form) {
                    NpToken::MFun
                } else if self.prefixes.contains(&word.lc_form) {
                    NpToken::MPref
                } else if self.suffixes.contains(&word.lc_form) {
                    NpToken::MSuf
                } else {
                    NpToken::Other
                }
            }
            None => NpToken::Other,
        }
    }

    fn state_actions(&self, _from: NpState, to: NpState, token: NpToken, _idx: usize, scan: &mut NpScan) {
        if to == NpState::Np {
            scan.initial_noun = token == NpToken::SNounUpp;
        }
    }

    fn build_multiword(
        &self,
        sentence: &mut Sentence,
        start: usize,
        end: usize,
        _final_state: NpState,
        scan: &mut NpScan,
    ) -> Option<usize> {
        if !self.valid_span(&sentence.words[start..=end]) {
            return None;
        }

        if self.split_multiwords {
            for w in sentence.words[start..=end].iter_mut().filter(|w| starts_upper(&w.form)) {
                w.set_analysis(vec![Analysis::new(w.lc_form.clone(), self.ne_tag.clone())]);
                w.in_dict = true;
            }
            return Some(end + 1);
        }

        if start == end {
            let w = &mut sentence.words[start];
            let ne = Analysis::new(w.lc_form.clone(), self.ne_tag.clone());
            if scan.initial_noun {
                w.add_analysis(ne);
            } else {
                w.set_analysis(vec![ne]);
            }
            w.in_dict = true;
            self.log.trace(format!("single-word entity '{}'", w.form));
        } else {
            let mw = automaton::collapse(sentence, start, end);
            mw.set_analysis(vec![Analysis::new(mw.lc_form.clone(), self.ne_tag.clone())]);
            self.log.trace(format!("entity '{}' built", mw.form));
        }
        Some(start + 1)
    }

    fn logger(&self) -> &Logger {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "<Type>\nbasic\n</Type>\n<NE_Tag>\nNP00000\n</NE_Tag>\n\
<FunctionWords>\nde\n</FunctionWords>\n<SpecialPunct>\nFe\n</SpecialPunct>\n\
<Names>\njuan\n</Names>\n<Affixes>\nsa SUF\n</Affixes>\n";

    fn word(form: &str, analyses: &[(&str, &str)]) -> Word {
        let mut w = Word::new(form);
        w.set_analysis(analyses.iter().map(|(l, t)| Analysis::new(*l, *t)).collect());
        w
    }

    fn ner(text: &str) -> NpRecognizer {
        NpRecognizer::from_text("np.dat", text, Logger::null()).unwrap()
    }

    #[test]
    fn test_joins_capitalized_words_with_function_words() {
        let mut s = Sentence::from_words(vec![
            word("El", &[("el", "DA0MS0")]),
            word("Banco", &[("banco", "NCMS000")]),
            word("de", &[("de", "SPS00")]),
            word("España", &[]),
            word("abrió", &[("abrir", "VMIS3S0")]),
        ]);
        ner(CONFIG).analyze(&mut s);
        let forms: Vec<&str> = s.words.iter().map(|w| w.form.as_str()).collect();
        assert_eq!(forms, vec!["El", "Banco_de_España", "abrió"]);
        assert_eq!(s.words[1].tag(0), "NP00000");
        assert_eq!(s.words[1].lemma(0), "banco_de_españa");
    }

    #[test]
    fn test_trailing_function_word_is_not_included() {
        let mut s = Sentence::from_words(vec![
            word("vi", &[("ver", "VMIS1S0")]),
            word("Madrid", &[]),
            word("de", &[("de", "SPS00")]),
            word("noche", &[("noche", "NCFS000")]),
        ]);
        ner(CONFIG).analyze(&mut s);
        assert_eq!(s.len(), 4);
        assert_eq!(s.words[1].tag(0), "NP00000");
        assert_eq!(s.words[2].tag(0), "SPS00");
    }

    #[test]
    fn test_single_word_entity_is_not_guessed() {
        use crate::probability::{Probability, DEFAULT_THRESHOLD};

        let mut madrid = word("Madrid", &[]);
        madrid.in_dict = false;
        let mut s = Sentence::from_words(vec![word("vi", &[("ver", "VMIS1S0")]), madrid]);
        ner(CONFIG).analyze(&mut s);
        assert!(s.words[1].in_dict);

        let model = "<SingleTagFreq>\nNC 60\nVM 30\nNP 10\n</SingleTagFreq>\n\
<UnknownTags>\nNC 50\nVM 40\nRG 10\n</UnknownTags>\n";
        let prob = Probability::from_text("probabilitats.dat", model, DEFAULT_THRESHOLD, Logger::null()).unwrap();
        prob.analyze(&mut s);
        assert_eq!(s.words[1].n_analyses(), 1);
        assert_eq!(s.words[1].tag(0), "NP00000");
        assert_eq!(s.words[1].analyses[0].prob, 1.0);
    }

    #[test]
    fn test_sentence_initial_noun_keeps_analyses() {
        let mut s = Sentence::from_words(vec![word("Juan", &[("juan", "NCMS000")]), word("come", &[("comer", "VMIP3S0")])]);
        ner(CONFIG).analyze(&mut s);
        assert_eq!(s.words[0].n_analyses(), 2);
        assert_eq!(s.words[0].tag(0), "NCMS000");
        assert_eq!(s.words[0].analyses[1].tag, "NP00000");
    }

    #[test]
    fn test_sentence_initial_closed_word_is_not_entity() {
        let mut s = Sentence::from_words(vec![word("El", &[("el", "DA0MS0")]), word("perro", &[("perro", "NCMS000")])]);
        ner(CONFIG).analyze(&mut s);
        assert_eq!(s.words[0].tag(0), "DA0MS0");
    }

    #[test]
    fn test_suffix_extends_entity() {
        let mut s = Sentence::from_words(vec![
            word("la", &[("el", "DA0FS0")]),
            word("Telefónica", &[]),
            word("sa", &[]),
        ]);
        ner(CONFIG).analyze(&mut s);
        assert_eq!(s.len(), 2);
        assert_eq!(s.words[1].form, "Telefónica_sa");
    }

    #[test]
    fn test_split_multiwords_tags_components() {
        let cfg = format!("{CONFIG}<SplitMultiwords>\nyes\n</SplitMultiwords>\n");
        let mut s = Sentence::from_words(vec![
            word("en", &[("en", "SPS00")]),
            word("Nueva", &[("nuevo", "AQ0FS0")]),
            word("York", &[]),
        ]);
        ner(&cfg).analyze(&mut s);
        assert_eq!(s.len(), 3);
        assert_eq!(s.words[1].tag(0), "NP00000");
        assert_eq!(s.words[1].lemma(0), "nueva");
        assert_eq!(s.words[2].tag(0), "NP00000");
    }

    #[test]
    fn test_title_limit_rejects_long_titles() {
        let cfg = format!("{CONFIG}<TitleLimit>\n3\n</TitleLimit>\n");
        let mut s = Sentence::from_words(vec![
            word("leí", &[("leer", "VMIS1S0")]),
            word("Cien", &[]),
            word("Años", &[]),
            word("Perdidos", &[]),
        ]);
        ner(&cfg).analyze(&mut s);
        let forms: Vec<&str> = s.words.iter().map(|w| w.form.as_str()).collect();
        assert_eq!(forms, vec!["leí", "Cien", "Años_Perdidos"]);
    }

    #[test]
    fn test_invalid_type_is_fatal() {
        let err = NpRecognizer::from_text("np.dat", "<Type>\nbio\n</Type>\n", Logger::null()).unwrap_err();
        assert!(matches!(err, PlnError::Config { .. }));
    }
}
