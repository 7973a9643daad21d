//! # Atribuição de Probabilidades Léxicas
//!
//! Dá a cada análise de uma palavra uma probabilidade `P(tag | palavra)`:
//!
//! - palavras conhecidas: suavização de Lidstone sobre a frequência léxica da
//!   forma, ou, na falta dela, da classe de ambiguidade (com e sem `NP`), ou das
//!   frequências globais de tag; na suavização por classe entra também uma
//!   estimativa por sufixos ponderada por `BiassSuffixes`;
//! - palavras desconhecidas: o adivinhador propõe as tags de `<UnknownTags>`
//!   ausentes, aceitando as que passam do limiar.
//!
//! No fim as análises ficam ordenadas por probabilidade e selecionadas para k=0.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::config_file::{relative_to, ConfigFile};
use crate::error::{read_model_file, PlnError, Result};
use crate::language::{Analysis, Sentence, Word};
use crate::logging::Logger;
use crate::tagset::TagSet;

pub const DEFAULT_THRESHOLD: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    SingleTag,
    ClassTag,
    FormTag,
    Unknown,
    Theeta,
    Suffixes,
    SuffixBias,
    LambdaLexical,
    LambdaClass,
    TagsetFile,
}

#[derive(Debug)]
pub struct Probability {
    threshold: f64,
    tags: Option<TagSet>,
    bias_suffixes: f64,
    lambda_lexical: f64,
    lambda_class: f64,
    guesser_active: bool,
    single_tags: HashMap<String, f64>,
    class_tags: HashMap<String, HashMap<String, f64>>,
    lexical_tags: HashMap<String, HashMap<String, f64>>,
    unk_tags: BTreeMap<String, f64>,
    unk_suffixes: HashMap<String, HashMap<String, f64>>,
    theeta: f64,
    long_suffix: usize,
    log: Logger,
}

fn number(name: &str, line: usize, s: &str) -> Result<f64> {
    s.parse()
        .map_err(|_| PlnError::config(name, line, format!("invalid number '{s}'")))
}

/// Pares `tag freq` a partir de `items`.
fn tag_freqs(name: &str, line: usize, items: &[&str]) -> Result<HashMap<String, f64>> {
    items
        .chunks_exact(2)
        .map(|p| Ok((p[0].to_string(), number(name, line, p[1])?)))
        .collect()
}

impl Probability {
    pub fn from_file(path: &Path, threshold: f64, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, threshold, log)
    }

    /// Carrega de texto. O `<TagsetFile>` é resolvido relativo a `name`.
    pub fn from_text(name: &str, text: &str, threshold: f64, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_section("SingleTagFreq", Section::SingleTag)
            .with_section("ClassTagFreq", Section::ClassTag)
            .with_section("FormTagFreq", Section::FormTag)
            .with_section("UnknownTags", Section::Unknown)
            .with_section("Theeta", Section::Theeta)
            .with_section("Suffixes", Section::Suffixes)
            .with_section("BiassSuffixes", Section::SuffixBias)
            .with_section("LidstoneLambdaLexical", Section::LambdaLexical)
            .with_section("LidstoneLambdaClass", Section::LambdaClass)
            .with_section("TagsetFile", Section::TagsetFile);

        let mut p = Self {
            threshold,
            tags: None,
            bias_suffixes: 0.3,
            lambda_lexical: 0.1,
            lambda_class: 1.0,
            guesser_active: true,
            single_tags: HashMap::new(),
            class_tags: HashMap::new(),
            lexical_tags: HashMap::new(),
            unk_tags: BTreeMap::new(),
            unk_suffixes: HashMap::new(),
            theeta: 0.0,
            long_suffix: 0,
            log: log.clone(),
        };

        while let Some(line) = cfg.next_line()? {
            let items = line.fields();
            let Some((&first, rest)) = items.split_first() else {
                continue;
            };
            let n = line.line;
            match line.section {
                Section::SingleTag | Section::Unknown => {
                    let Some(freq) = rest.first() else {
                        log.warn(format!("{name}:{n}: tag '{first}' without frequency"));
                        continue;
                    };
                    let freq = number(name, n, freq)?;
                    if line.section == Section::SingleTag {
                        p.single_tags.insert(first.to_string(), freq);
                    } else {
                        p.unk_tags.insert(first.to_string(), freq);
                    }
                }
                Section::ClassTag => {
                    p.class_tags.insert(first.to_string(), tag_freqs(name, n, rest)?);
                }
                Section::FormTag => {
                    // o segundo campo é a classe de ambiguidade da forma
                    let pairs = rest.get(1..).unwrap_or_default();
                    p.lexical_tags.insert(first.to_string(), tag_freqs(name, n, pairs)?);
                }
                Section::Suffixes => {
                    let Some(count) = rest.first() else {
                        continue;
                    };
                    let count = number(name, n, count)?;
                    let mut freqs = tag_freqs(name, n, &rest[1..])?;
                    if count > 0.0 {
                        freqs.values_mut().for_each(|f| *f /= count);
                    }
                    p.long_suffix = p.long_suffix.max(first.chars().count());
                    p.unk_suffixes.insert(first.to_string(), freqs);
                }
                Section::Theeta => p.theeta = number(name, n, first)?,
                Section::SuffixBias => p.bias_suffixes = number(name, n, first)?,
                Section::LambdaLexical => p.lambda_lexical = number(name, n, first)?,
                Section::LambdaClass => p.lambda_class = number(name, n, first)?,
                Section::TagsetFile => {
                    let path = relative_to(Path::new(name), first);
                    p.tags = Some(TagSet::from_file(&path, log.for_module("tagset"))?);
                }
            }
        }

        normalize(&mut p.single_tags);
        let sum: f64 = p.unk_tags.values().sum();
        if sum > 0.0 {
            p.unk_tags.values_mut().for_each(|v| *v /= sum);
        }

        log.debug("probability assigner loaded");
        Ok(p)
    }

    pub fn with_tagset(mut self, tags: TagSet) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn set_activate_guesser(&mut self, active: bool) {
        self.guesser_active = active;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn short_tag(&self, tag: &str) -> String {
        match &self.tags {
            Some(ts) => ts.short_tag(tag),
            None => tag.to_string(),
        }
    }

    pub fn analyze(&self, sentence: &mut Sentence) {
        for word in &mut sentence.words {
            self.annotate_word(word);
        }
    }

    pub fn annotate_word(&self, word: &mut Word) {
        self.log.trace(format!("assigning probabilities to: {}", word.form));

        let known = word.n_analyses() > 0
            && (word.in_dict || word.tag(0).starts_with('F') || word.tag(0).starts_with('Z') || word.has_retokenizable());

        if known {
            self.smoothing(word);
        } else if self.guesser_active {
            self.log.trace(format!("form with no analysis, guessing {}", word.form));
            let mass = 1.0;
            let n = word.n_analyses() as f64;
            for a in &mut word.analyses {
                a.prob = mass / n;
            }
            let sum = self.guesser(word, mass);
            if sum > 0.0 {
                for a in &mut word.analyses {
                    a.prob /= sum;
                }
            }
        }

        word.sort_by_prob();
        word.select_all(0);

        for a in &mut word.analyses {
            for w in &mut a.retok {
                self.annotate_word(w);
            }
        }
    }

    /// Suavização para palavras com análises conhecidas.
    pub fn smoothing(&self, word: &mut Word) {
        let na = word.n_analyses();
        if na == 1 {
            self.log.trace("unambiguous form, prob set to 1");
            word.analyses[0].prob = 1.0;
            return;
        }

        let mut shorts: BTreeMap<String, f64> = BTreeMap::new();
        for a in &word.analyses {
            *shorts.entry(self.short_tag(&a.tag)).or_default() += 1.0;
        }

        let (table, backoff) = match self.lexical_tags.get(&word.lc_form) {
            Some(t) => {
                self.log.trace(format!("form {} lexical probabilities found", word.lc_form));
                (t, false)
            }
            None => {
                let with_np = shorts.keys().cloned().collect::<Vec<_>>().join("-");
                let without_np = shorts
                    .keys()
                    .filter(|k| *k != "NP")
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("-");
                self.log
                    .trace(format!("ambiguity class: [{with_np}], secondary class: [{without_np}]"));
                let class = self.class_tags.get(&with_np).or_else(|| {
                    (!without_np.is_empty() && without_np != with_np)
                        .then(|| self.class_tags.get(&without_np))
                        .flatten()
                });
                (class.unwrap_or(&self.single_tags), true)
            }
        };

        let sum: f64 = shorts
            .iter()
            .map(|(k, count)| table.get(k).copied().unwrap_or(0.0) * count)
            .sum();
        let lambda = if backoff { self.lambda_class } else { self.lambda_lexical };
        let norm = sum + lambda * na as f64;
        for a in &mut word.analyses {
            let p = table.get(&self.short_tag(&a.tag)).copied().unwrap_or(0.0);
            a.prob = (p + lambda) / norm;
        }

        if backoff {
            self.log.trace("using suffixes to smooth probs");
            let guesses: Vec<f64> = word
                .analyses
                .iter()
                .map(|a| self.compute_probability(&a.tag, a.prob, &word.lc_form))
                .collect();
            let total: f64 = guesses.iter().sum();
            if total > 0.0 {
                for (a, g) in word.analyses.iter_mut().zip(guesses) {
                    a.prob = (1.0 - self.bias_suffixes) * a.prob + self.bias_suffixes * g / total;
                }
            }
        }
    }

    /// Probabilidade de `tag` para a forma `s` combinando as estatísticas de
    /// sufixos, do mais curto ao mais longo, com decaimento `theeta`.
    pub fn compute_probability(&self, tag: &str, prob: f64, s: &str) -> f64 {
        let mut x = prob;
        let bounds: Vec<usize> = s.char_indices().map(|(i, _)| i).rev().collect();
        for (len, &start) in bounds.iter().enumerate() {
            if len >= self.long_suffix {
                break;
            }
            let Some(freqs) = self.unk_suffixes.get(&s[start..]) else {
                break;
            };
            let pt = freqs.get(tag).copied().unwrap_or(0.0);
            x = (pt + self.theeta * x) / (1.0 + self.theeta);
        }
        x
    }

    /// Propõe tags para uma palavra desconhecida. Devolve a massa total atribuída.
    pub fn guesser(&self, word: &mut Word, mass: f64) -> f64 {
        let form = word.lc_form.clone();
        let mut sum = if word.n_analyses() > 0 { mass } else { 0.0 };
        let mut parked_sum = 0.0;
        let mut parked = Vec::new();

        let present: HashSet<String> = word.analyses.iter().map(|a| self.short_tag(&a.tag)).collect();
        for (tag, &freq) in &self.unk_tags {
            if present.contains(&self.short_tag(tag)) {
                continue;
            }
            let p = self.compute_probability(tag, freq, &form);
            let analysis = Analysis::new(form.clone(), tag.clone()).with_prob(p);
            if p >= self.threshold {
                sum += p;
                word.add_analysis(analysis);
                self.log.trace(format!("   {tag} added, sum is {sum:.3}"));
            } else {
                parked_sum += p;
                parked.push(analysis);
            }
        }

        if word.n_analyses() == 0 {
            word.set_analysis(parked);
            sum = parked_sum;
        }
        sum
    }
}

fn normalize(table: &mut HashMap<String, f64>) {
    let sum: f64 = table.values().sum();
    if sum > 0.0 {
        table.values_mut().for_each(|v| *v /= sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "<SingleTagFreq>\nNC 60\nVM 30\nNP 10\n</SingleTagFreq>\n\
<ClassTagFreq>\nNC-VM NC 70 VM 30\n</ClassTagFreq>\n\
<FormTagFreq>\nbajo AQ-SP AQ 10 SP 90\n</FormTagFreq>\n\
<UnknownTags>\nNC 50\nVM 40\nRG 10\n</UnknownTags>\n\
<Theeta>\n0.5\n</Theeta>\n\
<Suffixes>\nr 100 VM 90 NC 10\nar 80 VM 80\n</Suffixes>\n";

    fn prob(threshold: f64) -> Probability {
        Probability::from_text("probabilitats.dat", MODEL, threshold, Logger::null()).unwrap()
    }

    fn word(form: &str, tags: &[&str]) -> Word {
        let mut w = Word::new(form);
        w.set_analysis(tags.iter().map(|t| Analysis::new(form, *t)).collect());
        w
    }

    fn total(w: &Word) -> f64 {
        w.analyses.iter().map(|a| a.prob).sum()
    }

    #[test]
    fn test_unambiguous_word_gets_one() {
        let mut w = word("casa", &["NC"]);
        prob(DEFAULT_THRESHOLD).annotate_word(&mut w);
        assert_eq!(w.analyses[0].prob, 1.0);
    }

    #[test]
    fn test_lexical_frequencies_win() {
        let mut w = word("bajo", &["AQ", "SP"]);
        prob(DEFAULT_THRESHOLD).annotate_word(&mut w);
        assert_eq!(w.tag(0), "SP");
        let expected_sp = (90.0 + 0.1) / (100.0 + 0.2);
        assert!((w.analyses[0].prob - expected_sp).abs() < 1e-9);
        assert!((total(&w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_class_backoff_sums_to_one() {
        let mut w = word("canto", &["VM", "NC"]);
        prob(DEFAULT_THRESHOLD).annotate_word(&mut w);
        assert_eq!(w.tag(0), "NC");
        assert!((total(&w) - 1.0).abs() < 1e-9);
        assert_eq!(w.n_selected(0), 2);
    }

    #[test]
    fn test_suffix_estimate() {
        let p = prob(DEFAULT_THRESHOLD);
        // r: VM 0.9; ar: VM 1.0
        let x = p.compute_probability("VM", 0.4, "cantar");
        let step1 = (0.9 + 0.5 * 0.4) / 1.5;
        let step2 = (1.0 + 0.5 * step1) / 1.5;
        assert!((x - step2).abs() < 1e-9);
    }

    #[test]
    fn test_guesser_for_unknown_word() {
        let mut w = Word::new("blogar");
        w.in_dict = false;
        prob(DEFAULT_THRESHOLD).annotate_word(&mut w);
        assert_eq!(w.tag(0), "VM");
        assert!((total(&w) - 1.0).abs() < 1e-9);
        assert!(w.analyses.iter().all(|a| a.lemma == "blogar"));
    }

    #[test]
    fn test_guesser_falls_back_to_parked_tags() {
        let mut w = Word::new("xyz");
        w.in_dict = false;
        prob(2.0).annotate_word(&mut w);
        assert_eq!(w.n_analyses(), 3);
        assert!((total(&w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tagset_file_is_resolved_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tags.dat"), "<DecompositionRules>\nN 2\nV 2\n</DecompositionRules>\n").unwrap();
        let model = format!("{MODEL}<TagsetFile>\n./tags.dat\n</TagsetFile>\n");
        let path = dir.path().join("prob.dat");
        std::fs::write(&path, model).unwrap();
        let p = Probability::from_file(&path, DEFAULT_THRESHOLD, Logger::null()).unwrap();
        let mut w = word("canto", &["VMIP1S0", "NCMS000"]);
        p.annotate_word(&mut w);
        assert_eq!(w.tag(0), "NCMS000");
    }
}
