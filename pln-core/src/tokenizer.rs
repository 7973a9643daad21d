//! # Tokenizador por Regras
//!
//! Divide o texto bruto em [`Word`]s usando uma lista ordenada de expressões
//! regulares carregada de arquivo. Cada palavra preserva o offset de byte original
//! (`start`/`finish`), de modo que o texto pode ser reconstruído a partir dos spans.
//!
//! ## Formato do Arquivo
//!
//! ```text
//! <Macros>
//! ALPHA \p{L}
//! </Macros>
//! <RegExps>
//! *ABBREVIATIONS 1 ({ALPHA}+\.)
//! CONTRACTION    2 ({ALPHA}+)('s)
//! WORD           0 {ALPHA}+
//! </RegExps>
//! <Abbreviations>
//! dr.
//! </Abbreviations>
//! ```
//!
//! - **Macros**: `{NOME}` é substituído pelo valor ao carregar as regras.
//! - **RegExps**: `nome grupos regex [CI]`. Com `grupos = 0` o casamento inteiro vira
//!   uma palavra; senão cada grupo `1..=grupos` vira uma palavra. `CI` ignora caixa.
//! - Regras com nome iniciado por `*` só valem se o texto capturado, em minúsculas,
//!   estiver na lista de abreviações.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use pln_core::logging::Logger;
//! use pln_core::tokenizer::Tokenizer;
//!
//! let rules = "<RegExps>\nWORD 0 \\p{L}+\nPUNCT 0 [.,]\n</RegExps>\n";
//! let tk = Tokenizer::from_text("tokenizer.dat", rules, Logger::null()).unwrap();
//! let words = tk.tokenize("Olá, mundo.");
//! assert_eq!(words.len(), 4);
//! ```

use std::collections::HashSet;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use unicode_segmentation::UnicodeSegmentation;

use crate::config_file::ConfigFile;
use crate::error::{read_model_file, PlnError, Result};
use crate::language::Word;
use crate::logging::Logger;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Macros,
    RegExps,
    Abbreviations,
}

/// Uma regra de tokenização compilada.
#[derive(Debug, Clone)]
struct Rule {
    name: String,
    /// Número de grupos que viram palavras (0 = casamento inteiro).
    substr: usize,
    re: Regex,
}

impl Rule {
    fn abbreviation_only(&self) -> bool {
        self.name.starts_with('*')
    }
}

/// Tokenizador carregado de um arquivo de regras.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    rules: Vec<Rule>,
    abbreviations: HashSet<String>,
    log: Logger,
}

impl Tokenizer {
    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, log)
    }

    /// Carrega as regras do conteúdo de um arquivo.
    pub fn from_text(name: &str, text: &str, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_section("Macros", Section::Macros)
            .with_section("RegExps", Section::RegExps)
            .with_section("Abbreviations", Section::Abbreviations);

        let mut macros: Vec<(String, String)> = vec![];
        let mut rules = vec![];
        let mut abbreviations = HashSet::new();
        let mut seen_rule = false;

        while let Some(line) = cfg.next_line()? {
            let items = line.fields();
            match line.section {
                Section::Macros => {
                    if seen_rule {
                        return Err(PlnError::config(name, line.line, "macros must be defined before rules"));
                    }
                    let [mname, mvalue, ..] = items.as_slice() else {
                        log.warn(format!("{name}:{}: incomplete macro '{}'", line.line, line.text));
                        continue;
                    };
                    log.trace(format!("read macro {mname}: {mvalue}"));
                    macros.push((format!("{{{mname}}}"), mvalue.to_string()));
                }
                Section::RegExps => {
                    seen_rule = true;
                    let [rname, substr, pattern, rest @ ..] = items.as_slice() else {
                        log.warn(format!("{name}:{}: incomplete rule '{}'", line.line, line.text));
                        continue;
                    };
                    let Ok(substr) = substr.parse::<usize>() else {
                        log.warn(format!("{name}:{}: bad group count in rule {rname}", line.line));
                        continue;
                    };
                    let mut pattern = pattern.to_string();
                    for (mname, mvalue) in &macros {
                        pattern = pattern.replace(mname.as_str(), mvalue);
                    }
                    let case_insensitive = rest.first() == Some(&"CI");
                    match RegexBuilder::new(&format!("^(?:{pattern})"))
                        .case_insensitive(case_insensitive)
                        .build()
                    {
                        Ok(re) => {
                            log.trace(format!("stored rule {rname} {pattern} {substr}"));
                            rules.push(Rule {
                                name: rname.to_string(),
                                substr,
                                re,
                            });
                        }
                        Err(e) => log.warn(format!("rule {rname} [{pattern}] failed to be compiled: {e}")),
                    }
                }
                Section::Abbreviations => {
                    abbreviations.insert(line.text.to_lowercase());
                }
            }
        }

        log.debug(format!("tokenizer created with {} rules", rules.len()));
        Ok(Self {
            rules,
            abbreviations,
            log,
        })
    }

    /// Tokeniza o texto; spans relativos ao início de `text`.
    pub fn tokenize(&self, text: &str) -> Vec<Word> {
        self.tokenize_at(text, 0)
    }

    /// Tokeniza o texto, somando `offset` aos spans (para textos que são trechos de um documento).
    pub fn tokenize_at(&self, text: &str, offset: usize) -> Vec<Word> {
        let mut words = vec![];
        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            let trimmed = rest.trim_start();
            pos += rest.len() - trimmed.len();
            if trimmed.is_empty() {
                break;
            }
            let chunk_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
            let chunk = &trimmed[..chunk_end];

            match self.match_rules(chunk) {
                Some((spans, advance)) => {
                    for (s, e) in spans {
                        let form = &chunk[s..e];
                        self.log.trace(format!("accepting matched substring [{form}]"));
                        words.push(Word::new(form).with_span(offset + pos + s, offset + pos + e));
                    }
                    pos += advance;
                }
                None => {
                    let skipped = first_grapheme_len(chunk);
                    self.log.warn(format!(
                        "no rule matched input substring '{chunk}', character '{}' skipped",
                        &chunk[..skipped]
                    ));
                    pos += skipped;
                }
            }
        }
        words
    }

    /// Primeira regra que casa no início do trecho: spans não vazios das palavras e avanço.
    fn match_rules(&self, chunk: &str) -> Option<(Vec<(usize, usize)>, usize)> {
        'rules: for rule in &self.rules {
            let Some(caps) = rule.re.captures(chunk) else {
                continue;
            };
            let groups: Vec<(usize, usize)> = if rule.substr == 0 {
                caps.get(0).map(|m| vec![(m.start(), m.end())]).unwrap_or_default()
            } else {
                (1..=rule.substr)
                    .filter_map(|j| caps.get(j))
                    .map(|m| (m.start(), m.end()))
                    .collect()
            };
            if rule.abbreviation_only() {
                for &(s, e) in &groups {
                    if !self.abbreviations.contains(&chunk[s..e].to_lowercase()) {
                        self.log
                            .trace(format!("match for {} not in abbreviation list", rule.name));
                        continue 'rules;
                    }
                }
            }
            let advance = groups.iter().map(|&(_, e)| e).max().unwrap_or(0);
            if advance == 0 {
                continue;
            }
            self.log.trace(format!("rule {} matched", rule.name));
            let spans = groups.into_iter().filter(|(s, e)| e > s).collect();
            return Some((spans, advance));
        }
        None
    }
}

fn first_grapheme_len(s: &str) -> usize {
    s.graphemes(true).next().map(str::len).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use std::sync::Arc;

    const RULES: &str = r#"## toy tokenizer
<Macros>
ALPHA \p{L}
</Macros>
<RegExps>
*ABBREVIATIONS 1 ({ALPHA}+\.)
CONTRACTION 2 ({ALPHA}+)('s)
WORD 0 {ALPHA}+
NUMBER 0 [0-9]+(?:[.,][0-9]+)*
PUNCT 0 [.,;:!?"'()]
</RegExps>
<Abbreviations>
Dr.
</Abbreviations>
"#;

    fn tokenizer() -> (Tokenizer, MemorySink) {
        let sink = MemorySink::new();
        let tk = Tokenizer::from_text("tokenizer.dat", RULES, Logger::new("tokenizer", Arc::new(sink.clone()))).unwrap();
        (tk, sink)
    }

    fn forms(words: &[Word]) -> Vec<&str> {
        words.iter().map(|w| w.form.as_str()).collect()
    }

    #[test]
    fn test_abbreviation_rule_needs_whitelist() {
        let (tk, _) = tokenizer();
        let words = tk.tokenize("Dr. Smith went to Paris.");
        assert_eq!(forms(&words), vec!["Dr.", "Smith", "went", "to", "Paris", "."]);
    }

    #[test]
    fn test_group_rules_split_contractions() {
        let (tk, _) = tokenizer();
        let words = tk.tokenize("John's car");
        assert_eq!(forms(&words), vec!["John", "'s", "car"]);
        assert_eq!((words[1].start, words[1].finish), (4, 6));
    }

    #[test]
    fn test_spans_reproduce_text() {
        let (tk, _) = tokenizer();
        let text = "  Ávila, 3,5 km (aprox.)!\tFim.";
        let words = tk.tokenize(text);
        let mut rebuilt = String::new();
        let mut last = 0;
        for w in &words {
            assert_eq!(&text[w.start..w.finish], w.form);
            assert!(text[last..w.start].chars().all(char::is_whitespace));
            rebuilt.push_str(&text[last..w.finish]);
            last = w.finish;
        }
        rebuilt.push_str(&text[last..]);
        assert_eq!(rebuilt, text);
        assert_eq!(words[2].form, "3,5");
    }

    #[test]
    fn test_unmatched_character_is_skipped_with_warning() {
        let (tk, sink) = tokenizer();
        let words = tk.tokenize("a § b");
        assert_eq!(forms(&words), vec!["a", "b"]);
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_offset_is_added_to_spans() {
        let (tk, _) = tokenizer();
        let words = tk.tokenize_at("ok", 10);
        assert_eq!((words[0].start, words[0].finish), (10, 12));
    }

    #[test]
    fn test_macro_after_rule_is_fatal() {
        let text = "<RegExps>\nW 0 a\n</RegExps>\n<Macros>\nX y\n</Macros>\n";
        assert!(Tokenizer::from_text("t.dat", text, Logger::null()).is_err());
    }

    #[test]
    fn test_bad_regex_is_skipped() {
        let sink = MemorySink::new();
        let text = "<RegExps>\nBAD 0 (unclosed\nW 0 [a-z]+\n</RegExps>\n";
        let tk = Tokenizer::from_text("t.dat", text, Logger::new("tokenizer", Arc::new(sink.clone()))).unwrap();
        assert_eq!(tk.tokenize("abc").len(), 1);
        assert_eq!(sink.warnings().len(), 1);
    }
}
