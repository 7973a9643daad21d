//! # Leitor de Arquivos Seccionados
//!
//! Todos os modelos do pipeline são arquivos texto divididos em seções:
//!
//! ```text
//! ## comentário
//! <Macros>
//! ALPHA [[:alpha:]]
//! </Macros>
//! ```
//!
//! O leitor devolve apenas as linhas de conteúdo, junto com a seção em que estão.
//! Seções desconhecidas são fatais, a não ser que `skip_unknown` esteja ligado
//! (nesse caso o conteúdo delas é ignorado).

use std::collections::HashMap;
use std::path::Path;

use crate::error::{read_model_file, PlnError, Result};
use crate::logging::Logger;

/// Prefixo de comentário padrão.
pub const DEFAULT_COMMENT: &str = "##";

/// Uma linha de conteúdo dentro de uma seção conhecida.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentLine<S> {
    /// Seção em que a linha está.
    pub section: S,
    /// Texto da linha, sem espaços nas bordas.
    pub text: String,
    /// Número da linha no arquivo (1-based).
    pub line: usize,
    /// Verdadeiro se é a primeira linha de conteúdo da seção.
    pub section_start: bool,
}

impl<S> ContentLine<S> {
    /// Campos separados por espaço/tab.
    pub fn fields(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cursor<S> {
    Outside,
    Known(S),
    Unknown(String),
}

/// Leitor de arquivo seccionado, parametrizado pelo tipo que identifica as seções.
#[derive(Debug)]
pub struct ConfigFile<S> {
    name: String,
    lines: Vec<String>,
    sections: HashMap<String, S>,
    comment: String,
    skip_unknown: bool,
    pos: usize,
    cursor: Cursor<S>,
    fresh_section: bool,
    log: Logger,
}

impl<S: Copy + PartialEq> ConfigFile<S> {
    /// Cria o leitor sobre um texto já carregado. `name` aparece nas mensagens de erro.
    pub fn from_text(name: &str, text: &str, skip_unknown: bool, log: Logger) -> Self {
        Self {
            name: name.to_string(),
            lines: text.lines().map(|l| l.trim().to_string()).collect(),
            sections: HashMap::new(),
            comment: DEFAULT_COMMENT.to_string(),
            skip_unknown,
            pos: 0,
            cursor: Cursor::Outside,
            fresh_section: false,
            log,
        }
    }

    /// Abre um arquivo do disco.
    pub fn open(path: &Path, skip_unknown: bool, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Ok(Self::from_text(&path.display().to_string(), &text, skip_unknown, log))
    }

    /// Registra uma seção `<name>`...`</name>`.
    pub fn with_section(mut self, name: &str, section: S) -> Self {
        self.add_section(name, section);
        self
    }

    pub fn add_section(&mut self, name: &str, section: S) {
        self.sections.insert(name.to_string(), section);
    }

    /// Troca o prefixo de comentário (padrão `##`).
    pub fn with_comment(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.comment = prefix.to_string();
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line_number(&self) -> usize {
        self.pos
    }

    fn is_open(s: &str) -> bool {
        s.len() > 2 && s.starts_with('<') && !s.starts_with("</") && s.ends_with('>')
    }

    fn is_close(s: &str) -> bool {
        s.len() > 3 && s.starts_with("</") && s.ends_with('>')
    }

    fn is_comment(&self, s: &str) -> bool {
        s.is_empty() || s.contains(self.comment.as_str())
    }

    /// Próxima linha de conteúdo, ou `None` no fim do arquivo.
    pub fn next_line(&mut self) -> Result<Option<ContentLine<S>>> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].clone();
            self.pos += 1;
            let lineno = self.pos;

            match self.cursor.clone() {
                Cursor::Outside => {
                    if Self::is_open(&line) {
                        let name = &line[1..line.len() - 1];
                        match self.sections.get(name) {
                            Some(&sect) => {
                                self.log.trace(format!("entering section {line} in {}", self.name));
                                self.cursor = Cursor::Known(sect);
                                self.fresh_section = true;
                            }
                            None if self.skip_unknown => {
                                self.log.trace(format!("skipping unknown section {line} in {}", self.name));
                                self.cursor = Cursor::Unknown(name.to_string());
                            }
                            None => {
                                return Err(PlnError::UnknownSection {
                                    file: self.name.clone(),
                                    section: line,
                                })
                            }
                        }
                    } else if Self::is_close(&line) {
                        self.log.error(format!(
                            "unexpected closing of section {line} in {}:{lineno}",
                            self.name
                        ));
                    } else if !self.is_comment(&line) {
                        self.log.warn(format!(
                            "ignoring non-comment line outside sections in {}:{lineno}: {line}",
                            self.name
                        ));
                    }
                }
                Cursor::Known(current) => {
                    if Self::is_close(&line) {
                        let name = &line[2..line.len() - 1];
                        match self.sections.get(name) {
                            Some(&s) if s == current => {
                                self.cursor = Cursor::Outside;
                            }
                            Some(_) => {
                                return Err(PlnError::config(
                                    &self.name,
                                    lineno,
                                    format!("unexpected closing {line} inside another section"),
                                ))
                            }
                            None => {
                                return Err(PlnError::config(
                                    &self.name,
                                    lineno,
                                    format!("closing of unknown section {line}"),
                                ))
                            }
                        }
                    } else if Self::is_open(&line) {
                        return Err(PlnError::config(
                            &self.name,
                            lineno,
                            format!("unexpected nested opening of section {line}"),
                        ));
                    } else if !self.is_comment(&line) {
                        let section_start = self.fresh_section;
                        self.fresh_section = false;
                        return Ok(Some(ContentLine {
                            section: current,
                            text: line,
                            line: lineno,
                            section_start,
                        }));
                    }
                }
                Cursor::Unknown(open_name) => {
                    if Self::is_close(&line) {
                        let name = &line[2..line.len() - 1];
                        if name == open_name {
                            self.cursor = Cursor::Outside;
                        } else {
                            return Err(PlnError::config(
                                &self.name,
                                lineno,
                                format!("unexpected closing {line} of unknown section <{open_name}>"),
                            ));
                        }
                    } else if Self::is_open(&line) {
                        return Err(PlnError::config(
                            &self.name,
                            lineno,
                            format!("unexpected nested opening of section {line}"),
                        ));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Resolve `fname` relativo ao diretório do arquivo `base` (como fazem `TagsetFile`, `RelationFile`...).
pub fn relative_to(base: &Path, fname: &str) -> std::path::PathBuf {
    let fname = fname.strip_prefix("./").unwrap_or(fname);
    match base.parent() {
        Some(dir) => dir.join(fname),
        None => std::path::PathBuf::from(fname),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Sect {
        A,
        B,
    }

    fn reader(text: &str, skip: bool) -> (ConfigFile<Sect>, MemorySink) {
        let sink = MemorySink::new();
        let cfg = ConfigFile::from_text("test.dat", text, skip, Logger::new("cfg", Arc::new(sink.clone())))
            .with_section("A", Sect::A)
            .with_section("B", Sect::B);
        (cfg, sink)
    }

    fn collect(cfg: &mut ConfigFile<Sect>) -> Vec<ContentLine<Sect>> {
        let mut out = vec![];
        while let Some(l) = cfg.next_line().unwrap() {
            out.push(l);
        }
        out
    }

    #[test]
    fn test_reads_sections_and_skips_comments() {
        let (mut cfg, _) = reader("## head\n<A>\nx 1\n\n## c\ny 2\n</A>\n<B>\nz\n</B>\n", false);
        let lines = collect(&mut cfg);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].section, Sect::A);
        assert!(lines[0].section_start);
        assert!(!lines[1].section_start);
        assert_eq!(lines[1].fields(), vec!["y", "2"]);
        assert_eq!(lines[2].section, Sect::B);
        assert_eq!(lines[2].line, 9);
    }

    #[test]
    fn test_unknown_section_is_fatal_unless_skipped() {
        let (mut cfg, _) = reader("<C>\nq\n</C>\n", false);
        assert!(matches!(cfg.next_line(), Err(PlnError::UnknownSection { .. })));

        let (mut cfg, _) = reader("<C>\nq\n</C>\n<A>\nok\n</A>\n", true);
        let lines = collect(&mut cfg);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "ok");
    }

    #[test]
    fn test_nested_and_mismatched_sections_fail() {
        let (mut cfg, _) = reader("<A>\n<B>\n</B>\n</A>\n", false);
        assert!(cfg.next_line().is_err());

        let (mut cfg, _) = reader("<A>\nx\n</B>\n", false);
        assert!(cfg.next_line().unwrap().is_some());
        assert!(cfg.next_line().is_err());
    }

    #[test]
    fn test_stray_lines_outside_sections_warn() {
        let (mut cfg, sink) = reader("stray\n</A>\n<A>\nx\n</A>\n", false);
        let lines = collect(&mut cfg);
        assert_eq!(lines.len(), 1);
        assert_eq!(sink.warnings().len(), 2);
    }

    #[test]
    fn test_relative_to_uses_parent_dir() {
        let p = relative_to(Path::new("/data/en/tagger.dat"), "./tagset.dat");
        assert_eq!(p, Path::new("/data/en/tagset.dat"));
    }
}
