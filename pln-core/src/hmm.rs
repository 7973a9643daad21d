//! # Etiquetador HMM de Trigramas
//!
//! Desambigua as tags morfológicas de cada sentença com um Hidden Markov Model
//! de segunda ordem:
//! - **Estados**: bigramas de tags curtas `(t1, t2)`.
//! - **Transição** `P(t3 | t1, t2)`: interpolação linear `c1·P(t3) + c2·P(t2,t3)
//!   + c3·P(t1,t2,t3)`, zerada por trigramas proibidos.
//! - **Emissão**: inversão de Bayes sobre as probabilidades léxicas já
//!   atribuídas, `log P(t|w) + log P(w) − log P(t)`.
//!
//! As probabilidades ficam em **log-space**. A decodificação usa a [`Trellis`]
//! com os `k` melhores caminhos; o caminho `k` marca suas análises como
//! selecionadas para o índice `k`.
//!
//! ```text
//! <TagsetFile>
//! ./tagset.dat
//! </TagsetFile>
//! <Tag>
//! NC 0.3
//! x 0.01
//! </Tag>
//! <Bigram>
//! DA.NC 0.8
//! </Bigram>
//! <Initial>
//! 0.DA -0.7
//! 0.x -5.0
//! </Initial>
//! <Word>
//! el -3.1
//! <UNOBSERVED_WORD> -13.0
//! </Word>
//! <Smoothing>
//! c1 0.1
//! c2 0.3
//! c3 0.6
//! </Smoothing>
//! <Forbidden>
//! DA.VM.*
//! *.SP<de>.VM(sido)
//! </Forbidden>
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config_file::{relative_to, ConfigFile};
use crate::error::{read_model_file, PlnError, Result};
use crate::language::{Sentence, Word};
use crate::logging::Logger;
use crate::tagset::TagSet;
use crate::viterbi::{Bigram, Trellis, ZERO_LOGPROB};

const UNOBSERVED_INITIAL: &str = "0.x";
const UNOBSERVED_WORD: &str = "<UNOBSERVED_WORD>";

/// Quando eliminar a ambiguidade restante após a etiquetagem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForceMode {
    /// Mantém empates do HMM.
    None,
    /// Fica só com a primeira análise selecionada logo após etiquetar.
    #[default]
    Tagger,
    /// Força a seleção só depois da retokenização.
    Retok,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmOptions {
    pub kbest: usize,
    pub retokenize: bool,
    pub force: ForceMode,
}

impl Default for HmmOptions {
    fn default() -> Self {
        Self {
            kbest: 1,
            retokenize: true,
            force: ForceMode::Tagger,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Tag,
    Bigram,
    Trigram,
    Initial,
    Word,
    Smoothing,
    Forbidden,
    TagsetFile,
}

/// Uma posição de trigrama proibido: tag (`None` = `*`) e restrições opcionais.
#[derive(Debug, Clone, PartialEq)]
struct Slot {
    tag: Option<String>,
    lemma: Option<String>,
    form: Option<String>,
}

impl Slot {
    /// O lema é conferido só nas análises da palavra cuja tag curta é `tag`.
    fn matches(&self, tag: &str, word: Option<&Word>, short_tag: impl Fn(&str) -> String) -> bool {
        if self.tag.as_deref().is_some_and(|t| t != tag) {
            return false;
        }
        if let Some(form) = &self.form {
            if word.map_or(true, |w| &w.lc_form != form) {
                return false;
            }
        }
        if let Some(lemma) = &self.lemma {
            let found = word.is_some_and(|w| w.analyses.iter().any(|a| &a.lemma == lemma && short_tag(&a.tag) == tag));
            if !found {
                return false;
            }
        }
        true
    }
}

#[derive(Debug)]
pub struct HmmTagger {
    tags: Option<TagSet>,
    p_tag: HashMap<String, f64>,
    p_bigram: HashMap<Bigram, f64>,
    p_trigram: HashMap<String, f64>,
    p_initial: HashMap<Bigram, f64>,
    p_word: HashMap<String, f64>,
    forbidden: Vec<[Slot; 3]>,
    prob_initial: f64,
    prob_unobserved: f64,
    c: [f64; 3],
    options: HmmOptions,
    log: Logger,
}

fn number(name: &str, line: usize, s: Option<&&str>) -> Result<f64> {
    let s = s.copied().unwrap_or("");
    s.parse()
        .map_err(|_| PlnError::config(name, line, format!("invalid probability '{s}'")))
}

fn bigram(name: &str, line: usize, key: &str) -> Result<Bigram> {
    key.split_once('.')
        .map(|(a, b)| Bigram::new(a, b))
        .ok_or_else(|| PlnError::config(name, line, format!("invalid bigram '{key}'")))
}

impl HmmTagger {
    pub fn from_file(path: &Path, options: HmmOptions, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, options, log)
    }

    /// Carrega de texto. O `<TagsetFile>` é resolvido relativo a `name`; trigramas
    /// proibidos lidos antes dele usam as tags como estão.
    pub fn from_text(name: &str, text: &str, options: HmmOptions, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_section("Tag", Section::Tag)
            .with_section("Bigram", Section::Bigram)
            .with_section("Trigram", Section::Trigram)
            .with_section("Initial", Section::Initial)
            .with_section("Word", Section::Word)
            .with_section("Smoothing", Section::Smoothing)
            .with_section("Forbidden", Section::Forbidden)
            .with_section("TagsetFile", Section::TagsetFile);

        let mut hmm = Self {
            tags: None,
            p_tag: HashMap::new(),
            p_bigram: HashMap::new(),
            p_trigram: HashMap::new(),
            p_initial: HashMap::new(),
            p_word: HashMap::new(),
            forbidden: Vec::new(),
            prob_initial: 0.0,
            prob_unobserved: 0.0,
            c: [0.0; 3],
            options,
            log: log.clone(),
        };
        let (mut has_initial, mut has_unobserved) = (false, false);

        while let Some(line) = cfg.next_line()? {
            let items = line.fields();
            let Some(&key) = items.first() else {
                continue;
            };
            let n = line.line;
            match line.section {
                Section::Tag => {
                    hmm.p_tag.insert(key.to_string(), number(name, n, items.get(1))?);
                }
                Section::Bigram => {
                    hmm.p_bigram.insert(bigram(name, n, key)?, number(name, n, items.get(1))?);
                }
                Section::Trigram => {
                    hmm.p_trigram.insert(key.to_string(), number(name, n, items.get(1))?);
                }
                Section::Initial => {
                    let p = number(name, n, items.get(1))?;
                    if key == UNOBSERVED_INITIAL {
                        hmm.prob_initial = p;
                        has_initial = true;
                    } else {
                        hmm.p_initial.insert(bigram(name, n, key)?, p);
                    }
                }
                Section::Word => {
                    let p = number(name, n, items.get(1))?;
                    if key == UNOBSERVED_WORD {
                        hmm.prob_unobserved = p;
                        has_unobserved = true;
                    } else {
                        hmm.p_word.insert(key.to_string(), p);
                    }
                }
                Section::Smoothing => {
                    let p = number(name, n, items.get(1))?;
                    match key {
                        "c1" => hmm.c[0] = p,
                        "c2" => hmm.c[1] = p,
                        "c3" => hmm.c[2] = p,
                        other => log.warn(format!("{name}:{n}: unknown smoothing coefficient '{other}'")),
                    }
                }
                Section::Forbidden => {
                    match hmm.parse_forbidden(key) {
                        Some(slots) => hmm.forbidden.push(slots),
                        None => log.warn(format!("wrong format for forbidden trigram {key}, ignored")),
                    }
                }
                Section::TagsetFile => {
                    let path = relative_to(Path::new(name), key);
                    hmm.tags = Some(TagSet::from_file(&path, log.for_module("tagset"))?);
                }
            }
        }

        if !has_initial || !has_unobserved {
            return Err(PlnError::config(
                name,
                cfg.line_number(),
                format!("HMM model missing '{UNOBSERVED_INITIAL}' and/or '{UNOBSERVED_WORD}' entries"),
            ));
        }
        log.debug("HMM tagger loaded");
        Ok(hmm)
    }

    pub fn with_tagset(mut self, tags: TagSet) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn options(&self) -> &HmmOptions {
        &self.options
    }

    fn short_tag(&self, tag: &str) -> String {
        match &self.tags {
            Some(ts) => ts.short_tag(tag),
            None => tag.to_string(),
        }
    }

    /// `TAG`, `TAG<lema>`, `TAG(forma)`, `*` ou `0`, três posições separadas por `.`.
    fn parse_forbidden(&self, pattern: &str) -> Option<[Slot; 3]> {
        let parts: Vec<&str> = pattern.split('.').collect();
        let [a, b, c] = parts.as_slice() else {
            return None;
        };
        let mut slots = Vec::with_capacity(3);
        for part in [a, b, c] {
            let (tag, lemma, form) = if let Some((t, rest)) = part.split_once('<') {
                (t, Some(rest.trim_end_matches('>').to_string()), None)
            } else if let Some((t, rest)) = part.split_once('(') {
                (t, None, Some(rest.trim_end_matches(')').to_lowercase()))
            } else {
                (*part, None, None)
            };
            let wildcard = tag == "*" || tag == "0";
            if wildcard && (lemma.is_some() || form.is_some()) {
                return None;
            }
            let tag = match tag {
                "*" => None,
                "0" => Some("0".to_string()),
                t => Some(self.short_tag(t)),
            };
            slots.push(Slot { tag, lemma, form });
        }
        slots.try_into().ok()
    }

    /// Verdadeiro se o trigrama `(prev.first, prev.second, next.second)` terminando
    /// na palavra `t` é proibido.
    fn is_forbidden(&self, prev: &Bigram, next: &Bigram, words: &[Word], t: usize) -> bool {
        let tags = [prev.first.as_str(), prev.second.as_str(), next.second.as_str()];
        let at = |back: usize| t.checked_sub(back).and_then(|i| words.get(i));
        let ctx = [at(2), at(1), at(0)];
        self.forbidden
            .iter()
            .any(|slots| slots.iter().zip(tags).zip(ctx).all(|((s, tag), w)| s.matches(tag, w, |t| self.short_tag(t))))
    }

    /// Log-probabilidade de transição de `prev` para `next`, com `next` emitindo a
    /// palavra `t` de `words`.
    pub fn prob_a_log(&self, prev: &Bigram, next: &Bigram, words: &[Word], t: usize) -> f64 {
        if self.is_forbidden(prev, next, words, t) {
            self.log
                .trace(format!("forbidden trigram {}.{}.{}", prev.first, prev.second, next.second));
            return ZERO_LOGPROB;
        }
        let t3 = &next.second;
        let unigram = self
            .p_tag
            .get(t3)
            .or_else(|| self.p_tag.get("x"))
            .copied()
            .unwrap_or(0.0);
        let bigram = self.p_bigram.get(next).copied().unwrap_or(0.0);
        let trigram = self
            .p_trigram
            .get(&format!("{}.{}.{}", prev.first, prev.second, t3))
            .copied()
            .unwrap_or(0.0);
        (self.c[0] * unigram + self.c[1] * bigram + self.c[2] * trigram).ln()
    }

    /// Log-probabilidade de `state` emitir `word`.
    pub fn prob_b_log(&self, state: &Bigram, word: &Word) -> f64 {
        let tag = &state.second;
        let plog_word = self.p_word.get(&word.lc_form).copied().unwrap_or(self.prob_unobserved);
        let p_tag = self
            .p_tag
            .get(tag)
            .or_else(|| self.p_tag.get("x"))
            .copied()
            .unwrap_or(0.0);
        let pa: f64 = word
            .analyses
            .iter()
            .filter(|a| &self.short_tag(&a.tag) == tag)
            .map(|a| a.prob)
            .sum();
        pa.ln() + plog_word - p_tag.ln()
    }

    /// Log-probabilidade de começar a sentença em `state`.
    pub fn prob_pi_log(&self, state: &Bigram) -> f64 {
        match self.p_initial.get(state) {
            Some(p) => *p,
            None if state.first == "0" => self.prob_initial,
            None => ZERO_LOGPROB,
        }
    }

    /// Log-probabilidade da sequência de tags selecionada para `k`.
    pub fn sequence_prob_log(&self, sentence: &Sentence, k: usize) -> f64 {
        let words = &sentence.words;
        let Some(first) = words.first() else {
            return 0.0;
        };
        let mut state = Bigram::new("0", self.short_tag(first.tag(k)));
        let mut p = self.prob_pi_log(&state) + self.prob_b_log(&state, first);
        for (t, w) in words.iter().enumerate().skip(1) {
            let next = Bigram::new(state.second.clone(), self.short_tag(w.tag(k)));
            p += self.prob_a_log(&state, &next, words, t) + self.prob_b_log(&next, w);
            state = next;
        }
        p
    }

    /// Estados que podem ter emitido cada palavra, pelas análises selecionadas.
    fn find_states(&self, sentence: &Sentence) -> Vec<BTreeSet<Bigram>> {
        let shorts: Vec<BTreeSet<String>> = sentence
            .words
            .iter()
            .map(|w| w.selected(0).map(|a| self.short_tag(&a.tag)).collect())
            .collect();
        let mut states = Vec::with_capacity(shorts.len());
        for (i, tags) in shorts.iter().enumerate() {
            let prev: Vec<&str> = if i == 0 {
                vec!["0"]
            } else {
                shorts[i - 1].iter().map(String::as_str).collect()
            };
            states.push(
                prev.iter()
                    .flat_map(|p| tags.iter().map(move |t| Bigram::new(*p, t.clone())))
                    .collect(),
            );
        }
        states
    }

    /// Etiqueta a sentença: depois desta chamada, o caminho `k` tem suas análises
    /// selecionadas para o índice `k`.
    pub fn annotate(&self, sentence: &mut Sentence) {
        let n = sentence.len();
        if n == 0 {
            return;
        }
        let states = self.find_states(sentence);
        let words = &sentence.words;
        let mut tr = Trellis::new(n + 1, self.options.kbest);

        for s in &states[0] {
            let p = self.prob_pi_log(s) + self.prob_b_log(s, &words[0]);
            tr.insert(0, s, &Bigram::initial(), 0, p);
        }

        for t in 1..n {
            for s in &states[t] {
                let emission = self.prob_b_log(s, &words[t]);
                for prev in states[t - 1].iter().filter(|p| p.second == s.first) {
                    let transition = self.prob_a_log(prev, s, words, t);
                    for kb in 0..tr.nbest(t - 1, prev) {
                        let p = tr.delta(t - 1, prev, kb) + transition + emission;
                        tr.insert(t, s, prev, kb, p);
                    }
                }
            }
        }

        let end = Bigram::end();
        for s in &states[n - 1] {
            for kb in 0..tr.nbest(n - 1, s) {
                let p = tr.delta(n - 1, s, kb);
                tr.insert(n, &end, s, kb, p);
            }
        }

        let paths = tr.nbest(n, &end);
        if paths == 0 {
            self.log.warn("no tagging path found, selections left untouched");
            return;
        }

        for w in &mut sentence.words {
            for k in 0..w.num_kbest().max(1) {
                w.unselect_all(k);
            }
        }

        for bp in 0..paths {
            let mut back = tr.phi(n, &end, bp).map(|(s, kb)| (s.clone(), kb));
            for t in (0..n).rev() {
                let Some((state, kb)) = back else {
                    break;
                };
                let word = &mut sentence.words[t];
                let best = word
                    .analyses
                    .iter()
                    .filter(|a| self.short_tag(&a.tag) == state.second)
                    .map(|a| a.prob)
                    .fold(f64::NEG_INFINITY, f64::max);
                let chosen: Vec<usize> = (0..word.analyses.len())
                    .filter(|&i| {
                        let a = &word.analyses[i];
                        a.prob == best && self.short_tag(&a.tag) == state.second
                    })
                    .collect();
                for i in chosen {
                    word.analyses[i].mark_selected(bp);
                }
                back = tr.phi(t, &state, kb).map(|(s, kb)| (s.clone(), kb));
            }
        }
        self.log.trace(format!("sentence tagged with {paths} path(s)"));
    }

    /// Deixa uma única análise selecionada (k=0) por palavra.
    pub fn force_select(&self, sentence: &mut Sentence) {
        for w in &mut sentence.words {
            let Some(first) = w.analyses.iter().position(|a| a.is_selected(0)) else {
                continue;
            };
            w.unselect_all(0);
            w.analyses[first].mark_selected(0);
        }
    }

    /// Troca palavras cuja análise escolhida é retokenizável pelos seus componentes.
    fn retokenize(&self, sentence: &mut Sentence) -> bool {
        let mut changed = false;
        let mut out = Vec::with_capacity(sentence.words.len());
        for w in std::mem::take(&mut sentence.words) {
            let retok = w
                .first_selected(0)
                .filter(|a| a.is_retokenizable())
                .map(|a| a.retok.clone());
            match retok {
                Some(parts) => {
                    self.log.trace(format!("retokenizing '{}'", w.form));
                    out.extend(crate::dictionary::distribute_span(parts, w.start, w.finish));
                    changed = true;
                }
                None => out.push(w),
            }
        }
        sentence.words = out;
        if changed {
            sentence.rebuild_word_index();
        }
        changed
    }

    /// Etiqueta a sentença conforme as opções (k-best, força, retokenização).
    pub fn analyze(&self, sentence: &mut Sentence) -> Result<()> {
        if let Some(w) = sentence
            .words
            .iter()
            .find(|w| w.analyses.iter().any(|a| !a.has_prob()))
        {
            return Err(PlnError::MissingProbabilities { word: w.form.clone() });
        }

        self.annotate(sentence);
        if self.options.force == ForceMode::Tagger {
            self.force_select(sentence);
        }
        if self.options.retokenize && self.retokenize(sentence) {
            self.annotate(sentence);
            if self.options.force != ForceMode::None {
                self.force_select(sentence);
            }
        }
        Ok(())
    }
}
