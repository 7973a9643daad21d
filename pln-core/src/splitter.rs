//! # Segmentador de Sentenças
//!
//! Agrupa a sequência de palavras do tokenizador em [`Sentence`]s. O estado da
//! segmentação (marcadores abertos, buffer da sentença corrente, contador de
//! sentenças) fica numa [`SplitterSession`], permitindo processar o texto em
//! pedaços sem perder sentenças que atravessam a fronteira entre eles.
//!
//! ## Formato do Arquivo
//!
//! ```text
//! <General>
//! AllowBetweenMarkers 0
//! MaxWords 0
//! </General>
//! <Markers>
//! ( )
//! " "
//! </Markers>
//! <SentenceEnd>
//! . 1
//! ! 0
//! </SentenceEnd>
//! <SentenceStart>
//! The
//! </SentenceStart>
//! ```
//!
//! Um finalizador com flag `1` é ambíguo: só fecha a sentença se a palavra seguinte
//! começa com maiúscula, é um iniciador conhecido, ou não existe.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config_file::ConfigFile;
use crate::error::{read_model_file, PlnError, Result};
use crate::language::{Sentence, Word};
use crate::logging::Logger;

/// Deslocamento dos códigos de marcadores com abertura igual ao fechamento.
pub const SAME: i32 = 100;
/// Tamanho a partir do qual um trecho sem divisão gera aviso.
pub const VERY_LONG: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    General,
    Markers,
    SentenceEnd,
    SentenceStart,
}

/// Estado de uma sessão de segmentação.
#[derive(Debug, Default)]
pub struct SplitterSession {
    between_mark: bool,
    no_split_count: usize,
    /// Pilha de marcadores abertos (topo no fim): código e forma.
    marks: Vec<(i32, String)>,
    buffer: Sentence,
    nsentence: usize,
}

impl SplitterSession {
    /// Descarta o estado de marcadores e o buffer, mantendo o contador de sentenças.
    fn reset(&mut self) {
        self.between_mark = false;
        self.no_split_count = 0;
        self.marks.clear();
        self.buffer = Sentence::new();
    }

    /// Palavras acumuladas ainda sem sentença.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn emit(&mut self, out: &mut Vec<Sentence>) {
        self.nsentence += 1;
        let mut sentence = std::mem::take(&mut self.buffer);
        sentence.id = self.nsentence.to_string();
        sentence.rebuild_word_index();
        out.push(sentence);
        self.reset();
    }
}

#[derive(Debug, Clone)]
pub struct Splitter {
    allow_between_markers: bool,
    max_words: usize,
    markers: HashMap<String, i32>,
    /// Finalizadores: `true` = sempre divide, `false` = ambíguo.
    enders: HashMap<String, bool>,
    starters: HashSet<String>,
    log: Logger,
}

impl Splitter {
    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, log)
    }

    pub fn from_text(name: &str, text: &str, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_section("General", Section::General)
            .with_section("Markers", Section::Markers)
            .with_section("SentenceEnd", Section::SentenceEnd)
            .with_section("SentenceStart", Section::SentenceStart);

        let mut splitter = Self {
            allow_between_markers: true,
            max_words: 0,
            markers: HashMap::new(),
            enders: HashMap::new(),
            starters: HashSet::new(),
            log: log.clone(),
        };
        let mut nmk = 1;

        while let Some(line) = cfg.next_line()? {
            let items = line.fields();
            match (line.section, items.as_slice()) {
                (Section::General, ["AllowBetweenMarkers", v, ..]) => {
                    splitter.allow_between_markers = parse_flag(v);
                }
                (Section::General, ["MaxWords", v, ..]) => {
                    splitter.max_words = v
                        .parse()
                        .map_err(|_| PlnError::config(name, line.line, format!("bad MaxWords value '{v}'")))?;
                }
                (Section::General, _) => {
                    return Err(PlnError::config(
                        name,
                        line.line,
                        format!("unexpected splitter option '{}'", line.text),
                    ))
                }
                (Section::Markers, [open, close, ..]) => {
                    if open == close {
                        splitter.markers.insert(open.to_string(), SAME + nmk);
                    } else {
                        splitter.markers.insert(open.to_string(), nmk);
                        splitter.markers.insert(close.to_string(), -nmk);
                    }
                    nmk += 1;
                }
                (Section::SentenceEnd, [form, flag, ..]) => {
                    splitter.enders.insert(form.to_string(), !parse_flag(flag));
                }
                (Section::SentenceStart, _) => {
                    splitter.starters.insert(line.text.clone());
                }
                _ => log.warn(format!("{name}:{}: ignoring malformed line '{}'", line.line, line.text)),
            }
        }
        log.debug("splitter created");
        Ok(splitter)
    }

    pub fn open_session(&self) -> SplitterSession {
        self.log.trace("opening new session");
        SplitterSession::default()
    }

    /// Encerra a sessão, devolvendo as palavras pendentes (se houver) como última sentença.
    pub fn close_session(&self, mut session: SplitterSession) -> Option<Sentence> {
        self.log.trace("closing session");
        let mut out = vec![];
        if session.pending() > 0 {
            session.emit(&mut out);
        }
        out.pop()
    }

    /// Consome `words` e devolve as sentenças completadas. Com `flush`, o que sobrar
    /// no buffer também vira sentença.
    pub fn split(&self, session: &mut SplitterSession, words: Vec<Word>, flush: bool) -> Vec<Sentence> {
        let mut out = vec![];
        let followers: Vec<Option<String>> = words
            .iter()
            .skip(1)
            .map(|w| Some(w.form.clone()))
            .chain(std::iter::once(None))
            .collect();

        for (word, next) in words.into_iter().zip(followers) {
            let m = self.markers.get(&word.form).copied().unwrap_or(0);
            let mut check_split = true;

            let closes_top = session.marks.last().is_some_and(|(top, _)| {
                m != 0 && m == if m > SAME { *top } else { -*top }
            });

            if session.between_mark && !self.allow_between_markers && closes_top {
                self.log.trace(format!("end no-split period, marker {} code {m}", word.form));
                session.marks.pop();
                if session.marks.is_empty() {
                    session.between_mark = false;
                    session.no_split_count = 0;
                } else {
                    session.no_split_count += 1;
                }
                session.buffer.push(word);
                continue;
            } else if m > 0 && !self.allow_between_markers {
                self.log.trace(format!("start no-split period, marker {} code {m}", word.form));
                session.marks.push((m, word.form.clone()));
                session.between_mark = true;
                session.no_split_count += 1;
                session.buffer.push(word);
                continue;
            } else if session.between_mark {
                session.no_split_count += 1;
                if self.max_words == 0 || session.no_split_count <= self.max_words {
                    check_split = false;
                }
                if session.no_split_count == VERY_LONG {
                    self.log.warn("sentence is very long");
                }
            }

            let splits = check_split
                && match self.enders.get(&word.form) {
                    Some(true) => true,
                    Some(false) => self.end_of_sentence(next.as_deref()),
                    None => false,
                };

            session.buffer.push(word);
            if splits {
                self.log.trace("sentence marker found");
                session.emit(&mut out);
            }
        }

        if flush && session.pending() > 0 {
            self.log.trace("flushing the remaining words into a sentence");
            session.emit(&mut out);
        }
        out
    }

    /// Fim de sentença para um finalizador ambíguo, dada a palavra seguinte.
    fn end_of_sentence(&self, next: Option<&str>) -> bool {
        match next {
            None => true,
            Some(form) => {
                let capitalized = !form.chars().next().is_some_and(char::is_lowercase);
                capitalized || self.starters.contains(form)
            }
        }
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v, "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use std::sync::Arc;

    const CONFIG: &str = "<General>\nAllowBetweenMarkers 0\nMaxWords 0\n</General>\n\
<Markers>\n( )\n\" \"\n</Markers>\n<SentenceEnd>\n. 1\n! 0\n</SentenceEnd>\n<SentenceStart>\nthe\n</SentenceStart>\n";

    fn splitter(config: &str) -> Splitter {
        Splitter::from_text("splitter.dat", config, Logger::null()).unwrap()
    }

    fn words(text: &str) -> Vec<Word> {
        text.split_whitespace().map(Word::new).collect()
    }

    fn bodies(sentences: &[Sentence]) -> Vec<String> {
        sentences.iter().map(Sentence::body).collect()
    }

    #[test]
    fn test_ambiguous_ender_needs_capital_or_starter() {
        let sp = splitter(CONFIG);
        let mut ses = sp.open_session();
        let out = sp.split(&mut ses, words("Dr . smith came . He left . the end . ok ."), true);
        assert_eq!(
            bodies(&out),
            vec!["Dr . smith came .", "He left .", "the end . ok ."]
        );
        let ids: Vec<&str> = out.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_unambiguous_ender_always_splits() {
        let sp = splitter(CONFIG);
        let mut ses = sp.open_session();
        let out = sp.split(&mut ses, words("wow ! nice"), false);
        assert_eq!(bodies(&out), vec!["wow !"]);
        assert_eq!(ses.pending(), 1);
        let last = sp.close_session(ses).unwrap();
        assert_eq!(last.body(), "nice");
        assert_eq!(last.id, "2");
    }

    #[test]
    fn test_no_split_inside_markers() {
        let sp = splitter(CONFIG);
        let mut ses = sp.open_session();
        let out = sp.split(&mut ses, words("He said ( stop ! Now ) . Then"), true);
        assert_eq!(bodies(&out), vec!["He said ( stop ! Now ) .", "Then"]);

        let out = sp.split(&mut ses, words("\" Go ! \" she said !"), true);
        assert_eq!(bodies(&out), vec!["\" Go ! \" she said !"]);
    }

    #[test]
    fn test_max_words_releases_markers() {
        let config = CONFIG.replace("MaxWords 0", "MaxWords 2");
        let sp = splitter(&config);
        let mut ses = sp.open_session();
        let out = sp.split(&mut ses, words("( a b c ! d"), true);
        assert_eq!(bodies(&out), vec!["( a b c !", "d"]);
    }

    #[test]
    fn test_session_carries_buffer_between_calls() {
        let sp = splitter(CONFIG);
        let mut ses = sp.open_session();
        assert!(sp.split(&mut ses, words("first part"), false).is_empty());
        let out = sp.split(&mut ses, words("continues . Next"), false);
        assert_eq!(bodies(&out), vec!["first part continues ."]);
        assert_eq!(out[0].words[3].position, 3);
    }

    #[test]
    fn test_no_words_lost() {
        let sp = splitter(CONFIG);
        let mut ses = sp.open_session();
        let input = "a ( b . C ) . d ! \" e . F \" g";
        let out = sp.split(&mut ses, words(input), true);
        assert!(out.iter().all(|s| !s.is_empty()));
        assert_eq!(bodies(&out).join(" "), input);
    }

    #[test]
    fn test_unknown_option_is_fatal() {
        let bad = "<General>\nFoo 1\n</General>\n";
        assert!(Splitter::from_text("s.dat", bad, Logger::null()).is_err());
    }

    #[test]
    fn test_very_long_sentence_warns() {
        let sink = MemorySink::new();
        let sp = Splitter::from_text("s.dat", CONFIG, Logger::new("splitter", Arc::new(sink.clone()))).unwrap();
        let mut ses = sp.open_session();
        let mut input = vec![Word::new("(")];
        input.extend((0..VERY_LONG).map(|_| Word::new("x")));
        sp.split(&mut ses, input, true);
        assert_eq!(sink.warnings().len(), 1);
    }
}
