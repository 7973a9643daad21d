//! # Análise de Afixos
//!
//! Reconhece formas derivadas removendo sufixos/prefixos e procurando a raiz no
//! dicionário. Cada regra do arquivo (campos separados por tab):
//!
//! ```text
//! <Suffixes>
//! ## afixo term   cond  saída   acc enc nomore lema always retok
//! mente   *       ^AQ   RG      0   0   1      F    0      -
//! ndo     r|ar    ^V    VMG0000 0   0   1      L    0      -
//! </Suffixes>
//! ```
//!
//! - `term`: terminações alternativas (`|`) a recolocar na raiz (`*` = nada).
//! - `cond`: regex que a tag encontrada no dicionário precisa satisfazer.
//! - `saída`: tag resultante (`*` mantém a do dicionário).
//! - `lema`: partes unidas por `+`: `F` forma, `R` raiz, `L` lema do dicionário, `A` afixo.
//! - `retok`: `formas:tags` da retokenização (`$$` = a própria forma derivada).

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use regex::Regex;

use crate::accents::{accent_handler, AccentHandler};
use crate::config_file::ConfigFile;
use crate::dictionary::FormLookup;
use crate::error::{read_model_file, Result};
use crate::language::{apply_capitalization, capitalization, Analysis, Capitalization, Word};
use crate::logging::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffixKind {
    Suffix = 0,
    Prefix = 1,
}

/// Uma regra de afixo.
#[derive(Debug, Clone, Default)]
pub struct AffixRule {
    pub term: String,
    pub expression: String,
    /// Condição sobre a tag do dicionário; `None` aceita qualquer tag.
    pub cond: Option<Regex>,
    pub output: String,
    pub acc: bool,
    pub enc: bool,
    pub nomore: bool,
    pub lemma: String,
    pub always: bool,
    pub retok: String,
}

impl AffixRule {
    fn accepts(&self, tag: &str) -> bool {
        self.cond.as_ref().map_or(true, |re| re.is_match(tag))
    }

    /// Tag de saída para uma análise encontrada no dicionário.
    fn output_tag(&self, dict_tag: &str) -> String {
        if self.output == "*" {
            dict_tag.to_string()
        } else {
            self.output.clone()
        }
    }

    /// Monta o lema a partir da especificação `F+R+L+A`.
    fn build_lemma(&self, lc_form: &str, root: &str, dict_lemma: &str, affix: &str) -> String {
        self.lemma
            .split('+')
            .map(|part| match part.chars().next() {
                Some('F') => lc_form,
                Some('R') => root,
                Some('L') => dict_lemma,
                Some('A') => affix,
                _ => part,
            })
            .collect()
    }
}

type RuleTable = HashMap<String, Vec<AffixRule>>;

#[derive(Debug)]
pub struct Affixes {
    rules: [RuleTable; 2],
    always: [RuleTable; 2],
    lengths: [BTreeSet<usize>; 2],
    longest: [usize; 2],
    accents: Box<dyn AccentHandler>,
    log: Logger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Suffixes,
    Prefixes,
}

impl Affixes {
    pub fn from_file(path: &Path, lang: &str, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, lang, log)
    }

    pub fn from_text(name: &str, text: &str, lang: &str, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_comment("#")
            .with_section("Suffixes", Section::Suffixes)
            .with_section("Prefixes", Section::Prefixes);

        let mut affixes = Self {
            rules: Default::default(),
            always: Default::default(),
            lengths: Default::default(),
            longest: [0, 0],
            accents: accent_handler(lang),
            log: log.clone(),
        };

        while let Some(line) = cfg.next_line()? {
            let kind = match line.section {
                Section::Suffixes => AffixKind::Suffix as usize,
                Section::Prefixes => AffixKind::Prefix as usize,
            };
            let fields = line.fields();
            let [key, term, cond, output, acc, enc, nomore, lemma, always, retok, ..] = fields.as_slice() else {
                log.warn(format!("{name}:{}: affix rule needs 10 fields: '{}'", line.line, line.text));
                continue;
            };
            let re = match Regex::new(cond) {
                Ok(re) => re,
                Err(e) => {
                    log.warn(format!("{name}:{}: bad condition '{cond}': {e}", line.line));
                    continue;
                }
            };
            let rule = AffixRule {
                term: term.to_string(),
                expression: cond.to_string(),
                cond: Some(re),
                output: output.to_string(),
                acc: *acc == "1",
                enc: *enc == "1",
                nomore: *nomore == "1",
                lemma: lemma.to_string(),
                always: *always == "1",
                retok: if *retok == "-" { String::new() } else { retok.to_string() },
            };
            if rule.always {
                affixes.always[kind].entry(key.to_string()).or_default().push(rule.clone());
            }
            affixes.rules[kind].entry(key.to_string()).or_default().push(rule);
            let len = key.chars().count();
            affixes.lengths[kind].insert(len);
            affixes.longest[kind] = affixes.longest[kind].max(len);
        }
        log.debug("affix analyzer created");
        Ok(affixes)
    }

    /// Procura análises derivadas para a palavra. Palavras já conhecidas só usam
    /// as regras marcadas como `always`.
    pub fn look_for_affixes(&self, word: &mut Word, dict: &dyn FormLookup) {
        let tables = if word.n_analyses() > 0 {
            self.log
                .trace(format!("known word {}, looking only for 'always' affixes", word.form));
            &self.always
        } else {
            self.log.trace(format!("unknown word {}, looking for any affixes", word.form));
            &self.rules
        };
        self.look_in_list(AffixKind::Suffix, &tables[0], word, dict);
        self.look_in_list(AffixKind::Prefix, &tables[1], word, dict);
        self.look_for_combined(&tables[0], &tables[1], word, dict);
    }

    fn look_in_list(&self, kind: AffixKind, table: &RuleTable, word: &mut Word, dict: &dyn FormLookup) {
        let chars: Vec<char> = word.lc_form.chars().collect();
        let n = chars.len();
        let k = kind as usize;
        for i in 1..=self.longest[k] {
            if i >= n {
                break;
            }
            if !self.lengths[k].contains(&i) {
                continue;
            }
            let (affix, root): (String, String) = match kind {
                AffixKind::Suffix => (chars[n - i..].iter().collect(), chars[..n - i].iter().collect()),
                AffixKind::Prefix => (chars[..i].iter().collect(), chars[i..].iter().collect()),
            };
            let Some(rules) = table.get(&affix) else {
                continue;
            };
            for rule in rules {
                self.log
                    .trace(format!("trying rule [{affix} {} {} {}] on root {root}", rule.term, rule.expression, rule.output));
                let mut candidates = self.generate_roots(kind, rule, &root);
                self.accents.fix_accentuation(&mut candidates, rule);
                for cand in &candidates {
                    let found = dict.search_form(cand);
                    if !found.is_empty() {
                        self.apply_rule(cand, &found, &affix, rule, word, dict);
                    }
                }
            }
        }
    }

    /// Prefixo e sufixo ao mesmo tempo: a regra de prefixo é aplicada sobre a raiz
    /// e o resultado passa pela regra de sufixo.
    fn look_for_combined(&self, suffixes: &RuleTable, prefixes: &RuleTable, word: &mut Word, dict: &dyn FormLookup) {
        let chars: Vec<char> = word.lc_form.chars().collect();
        let n = chars.len();
        for &i in self.lengths[AffixKind::Suffix as usize].iter().filter(|&&i| i < n) {
            for &j in self.lengths[AffixKind::Prefix as usize].iter().filter(|&&j| j + i < n) {
                let suf: String = chars[n - i..].iter().collect();
                let pref: String = chars[..j].iter().collect();
                let (Some(srules), Some(prules)) = (suffixes.get(&suf), prefixes.get(&pref)) else {
                    continue;
                };
                let root: String = chars[j..n - i].iter().collect();
                self.log.trace(format!("trying a decomposition: {pref}+{root}+{suf}"));
                for srule in srules {
                    for prule in prules {
                        let mut cand1 = self.generate_roots(AffixKind::Suffix, srule, &root);
                        self.accents.fix_accentuation(&mut cand1, srule);
                        let mut candidates = BTreeSet::new();
                        for c in &cand1 {
                            let mut cand2 = self.generate_roots(AffixKind::Prefix, prule, c);
                            self.accents.fix_accentuation(&mut cand2, prule);
                            candidates.extend(cand2);
                        }
                        for cand in &candidates {
                            let intermediate: Vec<Analysis> = dict
                                .search_form(cand)
                                .into_iter()
                                .filter(|a| prule.accepts(&a.tag))
                                .map(|a| {
                                    let lemma = prule.build_lemma(&word.lc_form, cand, &a.lemma, &pref);
                                    Analysis::new(lemma, prule.output_tag(&a.tag))
                                })
                                .collect();
                            if intermediate.is_empty() {
                                continue;
                            }
                            if prule.nomore {
                                word.in_dict = true;
                            }
                            self.apply_rule(cand, &intermediate, &suf, srule, word, dict);
                        }
                    }
                }
            }
        }
    }

    /// Raízes candidatas: a raiz com cada terminação alternativa.
    pub fn generate_roots(&self, kind: AffixKind, rule: &AffixRule, root: &str) -> BTreeSet<String> {
        rule.term
            .split('|')
            .map(|t| if t == "*" { "" } else { t })
            .map(|t| match kind {
                AffixKind::Suffix => format!("{root}{t}"),
                AffixKind::Prefix => format!("{t}{root}"),
            })
            .collect()
    }

    /// Acrescenta à palavra as análises de `found` (análises da raiz) aceitas pela regra.
    pub fn apply_rule(
        &self,
        root: &str,
        found: &[Analysis],
        affix: &str,
        rule: &AffixRule,
        word: &mut Word,
        dict: &dyn FormLookup,
    ) {
        for a in found {
            if !rule.accepts(&a.tag) {
                self.log
                    .trace(format!("tag {} fails input condition {}", a.tag, rule.expression));
                continue;
            }
            if rule.nomore {
                word.in_dict = true;
            }
            let tag = rule.output_tag(&a.tag);
            let lemma = rule.build_lemma(&word.lc_form, root, &a.lemma, affix);
            self.log
                .trace(format!("analysis for the affixed form {root}: ({lemma},{tag})"));
            let retok = self.check_retokenizable(rule, root, &lemma, &tag, dict, capitalization(&word.form));

            match word
                .analyses
                .iter_mut()
                .find(|x| x.lemma == lemma && x.tag == tag)
            {
                None => {
                    let mut new = Analysis::new(lemma, tag);
                    new.retok = retok;
                    word.add_analysis(new);
                }
                Some(existing) => {
                    if !retok.is_empty() && !existing.is_retokenizable() {
                        existing.retok = retok;
                    }
                }
            }
        }
    }

    /// Palavras da retokenização da regra (vazio se a regra não retokeniza).
    fn check_retokenizable(
        &self,
        rule: &AffixRule,
        form: &str,
        lemma: &str,
        tag: &str,
        dict: &dyn FormLookup,
        caps: Capitalization,
    ) -> Vec<Word> {
        let Some((forms, tags)) = rule.retok.split_once(':') else {
            return vec![];
        };
        let mut out = vec![];
        for (k, (f, t)) in forms.split('+').zip(tags.split('+')).enumerate() {
            let first = k == 0;
            let mut w;
            if f == "$$" {
                w = Word::new(apply_capitalization(form, caps, first));
                w.add_analysis(Analysis::new(lemma, tag));
            } else {
                w = Word::new(apply_capitalization(f, caps, first));
                for a in dict.search_form(f).into_iter().filter(|a| a.tag.starts_with(t)) {
                    w.add_analysis(a);
                }
            }
            self.log
                .trace(format!("word {} ({},{}) added to decomposition list", w.form, w.lemma(0), w.tag(0)));
            out.push(w);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct ToyDict(HashMap<&'static str, Vec<(&'static str, &'static str)>>);

    impl FormLookup for ToyDict {
        fn search_form(&self, form: &str) -> Vec<Analysis> {
            self.0
                .get(form.to_lowercase().as_str())
                .map(|v| v.iter().map(|(l, t)| Analysis::new(*l, *t)).collect())
                .unwrap_or_default()
        }
    }

    fn dict() -> ToyDict {
        ToyDict(HashMap::from([
            ("rápida", vec![("rápido", "AQ0FS0")]),
            ("cantar", vec![("cantar", "VMN0000")]),
            ("hacer", vec![("hacer", "VMN0000")]),
            ("da", vec![("dar", "VMIP3S0")]),
            ("me", vec![("me", "PP1CS000")]),
        ]))
    }

    const RULES: &str = "<Suffixes>\n\
# comment\n\
mente\t*\t^AQ.F\tRG\t0\t0\t1\tF\t0\t-\n\
ndo\tr\t^VMN\tVMG0000\t0\t0\t1\tL\t0\t-\n\
me\t*\t^VMI\t*\t1\t1\t1\tL\t0\t$$+me:VMI+PP\n\
</Suffixes>\n\
<Prefixes>\n\
re\t*\t^VM\t*\t0\t0\t1\tL\t0\t-\n\
</Prefixes>\n";

    fn affixes() -> Affixes {
        Affixes::from_text("afixos.dat", RULES, "es", Logger::null()).unwrap()
    }

    fn tags(w: &Word) -> Vec<(String, String)> {
        w.analyses.iter().map(|a| (a.lemma.clone(), a.tag.clone())).collect()
    }

    #[test]
    fn test_suffix_rule_builds_lemma_and_tag() {
        let mut w = Word::new("rápidamente");
        w.in_dict = false;
        affixes().look_for_affixes(&mut w, &dict());
        assert_eq!(tags(&w), vec![("rápidamente".to_string(), "RG".to_string())]);
        assert!(w.in_dict);
    }

    #[test]
    fn test_termination_restored_on_root() {
        let mut w = Word::new("cantando");
        affixes().look_for_affixes(&mut w, &dict());
        assert_eq!(tags(&w), vec![("cantar".to_string(), "VMG0000".to_string())]);
    }

    #[test]
    fn test_prefix_and_combined_decomposition() {
        let mut w = Word::new("rehaciendo");
        affixes().look_for_affixes(&mut w, &dict());
        assert!(w.analyses.is_empty());

        let mut w = Word::new("rehacendo");
        affixes().look_for_affixes(&mut w, &dict());
        assert_eq!(tags(&w), vec![("hacer".to_string(), "VMG0000".to_string())]);
    }

    #[test]
    fn test_accent_fix_and_retokenization() {
        let mut w = Word::new("Dáme");
        affixes().look_for_affixes(&mut w, &dict());
        assert_eq!(tags(&w), vec![("dar".to_string(), "VMIP3S0".to_string())]);
        let retok = &w.analyses[0].retok;
        let forms: Vec<&str> = retok.iter().map(|x| x.form.as_str()).collect();
        assert_eq!(forms, vec!["Da", "me"]);
        assert_eq!(retok[1].tag(0), "PP1CS000");
    }

    #[test]
    fn test_known_words_use_only_always_rules() {
        let mut w = Word::new("cantando");
        w.add_analysis(Analysis::new("cantando", "NCMS000"));
        affixes().look_for_affixes(&mut w, &dict());
        assert_eq!(w.n_analyses(), 1);
    }

    #[test]
    fn test_generate_roots_alternatives() {
        let rule = AffixRule {
            term: "r|ar|*".to_string(),
            ..AffixRule::default()
        };
        let roots = affixes().generate_roots(AffixKind::Suffix, &rule, "cant");
        let roots: Vec<&str> = roots.iter().map(String::as_str).collect();
        assert_eq!(roots, vec!["cant", "cantar", "cantr"]);
    }
}
