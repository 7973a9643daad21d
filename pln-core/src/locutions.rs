//! # Locuções (Multipalavras)
//!
//! Detecta sequências de palavras que formam uma unidade lexical
//! (`a_pesar_de`, `john_smith`) e as colapsa numa única palavra.
//!
//! ```text
//! <TagSet>
//! tagset.dat
//! </TagSet>
//! <OnlySelected>
//! no
//! </OnlySelected>
//! <Multiwords>
//! a_pesar_de a_pesar_de SPS00 I
//! <calle>_NP00000 $L1_$F2 NP00000 A
//! de_acuerdo de_acuerdo $2:AQ I
//! </Multiwords>
//! ```
//!
//! Cada componente da chave casa com a forma em minúsculas, com o lema entre
//! `<>` ou com a tag (curta, se houver tagset). No lema da entrada, `$Fn` e `$Ln`
//! são trocados pela forma ou lema do n-ésimo componente; uma tag `$n:TAG` copia
//! as tags do n-ésimo componente que começam com `TAG`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use regex::{Captures, Regex};

use crate::automaton::{self, Automaton};
use crate::config_file::{relative_to, ConfigFile};
use crate::error::{read_model_file, Result};
use crate::language::{Analysis, Sentence, Word};
use crate::logging::Logger;
use crate::tagset::TagSet;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    TagSet,
    Multiwords,
    OnlySelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocState {
    Prefix,
    Multiword,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocToken {
    Pref,
    Mw,
    Other,
}

#[derive(Debug, Clone)]
struct Entry {
    analyses: Vec<(String, String)>,
    ambiguous: bool,
}

/// Estado de uma tentativa de casamento.
#[derive(Debug, Default)]
pub struct LocutionScan {
    acc: BTreeSet<String>,
    longest: BTreeSet<String>,
}

#[derive(Debug)]
pub struct Locutions {
    locut: HashMap<String, Entry>,
    prefixes: HashSet<String>,
    tags: Option<TagSet>,
    only_selected: bool,
    placeholder: Regex,
    log: Logger,
}

impl Locutions {
    pub fn new(log: Logger) -> Result<Self> {
        Ok(Self {
            locut: HashMap::new(),
            prefixes: HashSet::new(),
            tags: None,
            only_selected: false,
            placeholder: Regex::new(r"\$([FL])(\d+)")?,
            log,
        })
    }

    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, log)
    }

    /// Carrega de texto. Um `<TagSet>` é resolvido relativo a `name`.
    pub fn from_text(name: &str, text: &str, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_section("TagSet", Section::TagSet)
            .with_section("Multiwords", Section::Multiwords)
            .with_section("OnlySelected", Section::OnlySelected);

        let mut loc = Self::new(log.clone())?;
        while let Some(line) = cfg.next_line()? {
            match line.section {
                Section::TagSet => {
                    let path = relative_to(Path::new(name), line.text.trim());
                    loc.tags = Some(TagSet::from_file(&path, log.for_module("tagset"))?);
                }
                Section::OnlySelected => {
                    loc.only_selected = matches!(line.text.trim(), "yes" | "true" | "1");
                }
                Section::Multiwords => loc.add_locution(&line.text),
            }
        }
        log.debug(format!("{} locutions loaded", loc.locut.len()));
        Ok(loc)
    }

    pub fn with_tagset(mut self, tags: TagSet) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn set_only_selected(&mut self, only: bool) {
        self.only_selected = only;
    }

    /// Acrescenta uma linha `chave lema tag [lema tag]... [A|I]`.
    pub fn add_locution(&mut self, line: &str) {
        let items: Vec<&str> = line.split_whitespace().collect();
        let [key, rest @ ..] = items.as_slice() else {
            return;
        };
        if rest.len() < 2 {
            self.log.warn(format!("locution '{key}' without lemma and tag, ignored"));
            return;
        }
        let mut analyses = Vec::new();
        let mut pairs = rest.chunks_exact(2);
        for pair in pairs.by_ref() {
            analyses.push((pair[0].to_string(), pair[1].to_string()));
        }
        let ambiguous = pairs.remainder().first().is_some_and(|flag| *flag == "A");
        self.locut.insert(key.to_string(), Entry { analyses, ambiguous });

        let mut prefix = String::new();
        let parts: Vec<&str> = key.split('_').collect();
        for part in &parts[..parts.len() - 1] {
            prefix.push_str(part);
            prefix.push('_');
            self.prefixes.insert(prefix.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.locut.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locut.is_empty()
    }

    pub fn analyze(&self, sentence: &mut Sentence) {
        if automaton::scan(self, sentence) {
            self.log.trace("multiwords built");
        }
    }

    /// Testa a chave `key`; devolve `(é_locução, é_prefixo)`.
    fn check(&self, key: String, acc: &mut BTreeSet<String>) -> (bool, bool) {
        if self.locut.contains_key(&key) {
            self.log.trace(format!("   added MW: {key}"));
            acc.insert(key);
            (true, false)
        } else if self.prefixes.contains(&format!("{key}_")) {
            self.log.trace(format!("   added PRF: {key}"));
            acc.insert(key);
            (false, true)
        } else {
            (false, false)
        }
    }

    /// Chaves candidatas para o componente `s`, estendendo as acumuladas.
    fn extend(previous: &BTreeSet<String>, s: &str) -> Vec<String> {
        if previous.is_empty() {
            vec![s.to_string()]
        } else {
            previous.iter().map(|a| format!("{a}_{s}")).collect()
        }
    }

    fn substitute(&self, lemma: &str, components: &[Word]) -> Option<String> {
        let mut ok = true;
        let out = self.placeholder.replace_all(lemma, |caps: &Captures| {
            let n: usize = caps[2].parse().unwrap_or(0);
            match components.get(n.wrapping_sub(1)) {
                Some(w) if &caps[1] == "F" => w.lc_form.clone(),
                Some(w) => w.lemma(0).to_string(),
                None => {
                    ok = false;
                    caps[0].to_string()
                }
            }
        });
        if ok {
            Some(out.into_owned())
        } else {
            self.log.warn(format!("invalid placeholder in locution lemma '{lemma}'"));
            None
        }
    }

    /// Análises da multipalavra segundo as entradas casadas, ou `None` se inválida.
    fn validate(&self, components: &[Word], scan: &LocutionScan) -> Option<(Vec<Analysis>, bool)> {
        let mut analyses = Vec::new();
        let mut ambiguous = false;
        let mut valid = false;

        for key in &scan.longest {
            let Some(entry) = self.locut.get(key) else {
                continue;
            };
            self.log.trace(format!("matched locution ({key})"));
            ambiguous |= entry.ambiguous;

            for (lemma, tag) in &entry.analyses {
                let Some(lemma) = self.substitute(lemma, components) else {
                    continue;
                };
                let Some(constraint) = tag.strip_prefix('$') else {
                    analyses.push(Analysis::new(lemma, tag.clone()));
                    valid = true;
                    continue;
                };
                let Some((n, check)) = constraint.split_once(':') else {
                    self.log.warn(format!("invalid tag in locution entry {key} {lemma} {tag}"));
                    continue;
                };
                let Some(word) = n.parse::<usize>().ok().and_then(|n| components.get(n.wrapping_sub(1))) else {
                    self.log.warn(format!("invalid component in locution entry {key} {lemma} {tag}"));
                    continue;
                };
                let before = analyses.len();
                for a in word.analyses.iter().filter(|a| a.tag.starts_with(check)) {
                    analyses.push(Analysis::new(lemma.clone(), a.tag.clone()));
                }
                valid = analyses.len() > before;
                if !valid {
                    self.log
                        .trace(format!("validation failed: tag {tag} not found in word '{}'", word.form));
                }
            }
        }

        valid.then_some((analyses, ambiguous))
    }
}

impl Automaton for Locutions {
    type State = LocState;
    type Token = LocToken;
    type ScanState = LocutionScan;

    fn initial_state(&self) -> LocState {
        LocState::Prefix
    }

    fn is_stop(&self, state: LocState) -> bool {
        state == LocState::Stop
    }

    fn is_final(&self, state: LocState) -> bool {
        state == LocState::Multiword
    }

    fn transition(&self, state: LocState, token: LocToken) -> LocState {
        match (state, token) {
            (LocState::Stop, _) | (_, LocToken::Other) => LocState::Stop,
            (_, LocToken::Pref) => LocState::Prefix,
            (_, LocToken::Mw) => LocState::Multiword,
        }
    }

    fn compute_token(&self, _state: LocState, words: &mut [Word], idx: usize, scan: &mut LocutionScan) -> LocToken {
        let word = &mut words[idx];
        if word.locked {
            return LocToken::Other;
        }

        let mut acc = BTreeSet::new();
        let (mut mw, mut pref) = (false, false);
        let form = word.lc_form.clone();

        if word.analyses.is_empty() {
            for key in Self::extend(&scan.acc, &form) {
                let (m, p) = self.check(key, &mut acc);
                mw |= m;
                pref |= p;
            }
        } else {
            let candidates: Vec<usize> = (0..word.analyses.len())
                .filter(|&i| !self.only_selected || word.analyses[i].is_selected(0))
                .collect();
            for i in candidates {
                let lemma = format!("<{}>", word.analyses[i].lemma);
                let tag = match &self.tags {
                    Some(ts) => ts.short_tag(&word.analyses[i].tag),
                    None => word.analyses[i].tag.clone(),
                };
                self.log.trace(format!("checking ({form},{lemma},{tag})"));
                for s in [&form, &lemma] {
                    for key in Self::extend(&scan.acc, s) {
                        let (m, p) = self.check(key, &mut acc);
                        mw |= m;
                        pref |= p;
                    }
                }
                let mut tag_hit = false;
                for key in Self::extend(&scan.acc, &tag) {
                    let (m, p) = self.check(key, &mut acc);
                    tag_hit |= m || p;
                    mw |= m;
                    pref |= p;
                }
                if tag_hit {
                    word.unselect_all(0);
                    word.analyses[i].mark_selected(0);
                }
            }
        }

        if mw {
            scan.longest = acc.clone();
        }
        scan.acc = acc;

        if mw {
            LocToken::Mw
        } else if pref {
            LocToken::Pref
        } else {
            LocToken::Other
        }
    }

    fn build_multiword(
        &self,
        sentence: &mut Sentence,
        start: usize,
        end: usize,
        _final_state: LocState,
        scan: &mut LocutionScan,
    ) -> Option<usize> {
        let Some((analyses, ambiguous)) = self.validate(&sentence.words[start..=end], scan) else {
            self.log.trace("multiword found but rejected, sentence untouched");
            return None;
        };
        let mw = automaton::collapse(sentence, start, end);
        mw.set_analysis(analyses);
        mw.ambiguous_mw = ambiguous;
        self.log.trace(format!(
            "multiword '{}' built as ({},{}) {}",
            mw.form,
            mw.lemma(0),
            mw.tag(0),
            if ambiguous { "[A]" } else { "[I]" }
        ));
        Some(start + 1)
    }

    fn logger(&self) -> &Logger {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(form: &str, analyses: &[(&str, &str)]) -> Word {
        let mut w = Word::new(form);
        w.set_analysis(analyses.iter().map(|(l, t)| Analysis::new(*l, *t)).collect());
        w
    }

    fn locutions(text: &str) -> Locutions {
        Locutions::from_text("locucions.dat", text, Logger::null()).unwrap()
    }

    #[test]
    fn test_add_locution_stores_prefixes() {
        let mut loc = Locutions::new(Logger::null()).unwrap();
        loc.add_locution("a_pesar_de a_pesar_de SPS00 I");
        assert!(loc.prefixes.contains("a_"));
        assert!(loc.prefixes.contains("a_pesar_"));
        assert!(!loc.prefixes.contains("a_pesar_de_"));
        assert!(!loc.locut["a_pesar_de"].ambiguous);
    }

    #[test]
    fn test_collapses_form_locution() {
        let loc = locutions("<Multiwords>\njohn_smith john_smith NP\n</Multiwords>\n");
        let mut s = Sentence::from_words(vec![
            word("John", &[("john", "NP")]).with_span(0, 4),
            word("Smith", &[("smith", "NP")]).with_span(5, 10),
            word("went", &[("go", "VBD")]).with_span(11, 15),
        ]);
        loc.analyze(&mut s);
        assert_eq!(s.len(), 2);
        let mw = &s.words[0];
        assert_eq!(mw.form, "John_Smith");
        assert_eq!(mw.lc_form, "john_smith");
        assert_eq!((mw.start, mw.finish), (0, 10));
        assert_eq!(mw.tag(0), "NP");
        assert_eq!(mw.multiword.len(), 2);
        assert_eq!(s.words[1].position, 1);
    }

    #[test]
    fn test_longest_match_wins() {
        let loc = locutions(
            "<Multiwords>\na_pesar a_pesar RG I\na_pesar_de a_pesar_de SPS00 A\n</Multiwords>\n",
        );
        let mut s = Sentence::from_words(vec![
            word("a", &[("a", "SPS00")]),
            word("pesar", &[("pesar", "VMN0000")]),
            word("de", &[("de", "SPS00")]),
            word("todo", &[("todo", "PI0MS000")]),
        ]);
        loc.analyze(&mut s);
        assert_eq!(s.words[0].form, "a_pesar_de");
        assert_eq!(s.words[0].tag(0), "SPS00");
        assert!(s.words[0].ambiguous_mw);
        assert_eq!(s.words[1].form, "todo");
    }

    #[test]
    fn test_placeholders_and_constrained_tags() {
        let loc = locutions("<Multiwords>\n<calle>_NP00000 $L1_$F2 $2:NP I\n</Multiwords>\n");
        let mut s = Sentence::from_words(vec![
            word("Calle", &[("calle", "NCFS000")]),
            word("Mayor", &[("mayor", "NP00000"), ("mayor", "AQ0CS0")]),
        ]);
        loc.analyze(&mut s);
        assert_eq!(s.len(), 1);
        assert_eq!(s.words[0].lemma(0), "calle_mayor");
        assert_eq!(s.words[0].tag(0), "NP00000");
        assert_eq!(s.words[0].n_analyses(), 1);
    }

    #[test]
    fn test_rejected_when_constraint_fails() {
        let loc = locutions("<Multiwords>\nde_acuerdo de_acuerdo $2:AQ I\n</Multiwords>\n");
        let mut s = Sentence::from_words(vec![word("de", &[("de", "SPS00")]), word("acuerdo", &[("acuerdo", "NCMS000")])]);
        loc.analyze(&mut s);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_locked_words_never_start_locutions() {
        let loc = locutions("<Multiwords>\n._. dots Fs I\n</Multiwords>\n");
        let mut first = word(".", &[(".", "Fp")]);
        first.lock();
        let mut s = Sentence::from_words(vec![first, word(".", &[(".", "Fp")])]);
        loc.analyze(&mut s);
        assert_eq!(s.len(), 2);
    }
}
