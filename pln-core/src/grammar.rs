//! # Gramática do Chunker
//!
//! Carrega a DSL de regras livre de contexto usada pelo [`ChartParser`](crate::chart::ChartParser):
//!
//! ```text
//! % comentário até o fim da linha
//! sn ==> DT, +NN | +NP .
//! grup-verb ==> +VB* .
//! sp ==> IN(of), +sn .
//! @PRIOR sn grup-verb .
//! @HIDDEN aux .
//! @START S .
//! ```
//!
//! - `+` marca o governante da alternativa.
//! - `(forma)` e `<lema>` qualificam um terminal.
//! - `("arquivo")` e `<"arquivo">` referem uma lista de palavras.
//! - Categorias terminadas em `*` casam por prefixo.
//!
//! O parser é um autômato dirigido por tabela sobre os tokens do léxico. Erros de
//! sintaxe são registrados e os tokens descartados até o próximo `.`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::config_file::relative_to;
use crate::error::{read_model_file, PlnError, Result};
use crate::logging::Logger;

/// Governante da regra fictícia que junta os pedaços de uma cobertura parcial.
pub const NO_GOVERNOR: usize = usize::MAX;
const DEFAULT_GOVERNOR: usize = 0;
const DEFAULT_PRIORITY: usize = 9999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub head: String,
    pub right: Vec<String>,
    pub governor: usize,
}

impl Rule {
    pub fn new(head: impl Into<String>, right: Vec<String>, governor: usize) -> Self {
        Self {
            head: head.into(),
            right,
            governor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok {
    Category,
    Form,
    Lemma,
    Comment,
    Governor,
    Arrow,
    Bar,
    Comma,
    Dot,
    Flat,
    Hidden,
    NoTop,
    OnlyTop,
    Prior,
    Start,
    FileName,
}

#[derive(Debug, Clone, PartialEq)]
struct Token<'a> {
    kind: Option<Tok>,
    text: &'a str,
    line: usize,
}

/// Léxico por expressões ancoradas, testadas em ordem; a primeira que casa vence.
struct Lexer<'a> {
    rules: &'a [(Regex, Option<Tok>)],
    input: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(rules: &'a [(Regex, Option<Tok>)], input: &'a str) -> Self {
        Self {
            rules,
            input,
            pos: 0,
            line: 1,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            let rest = &self.input[self.pos..];
            let first = rest.chars().next()?;
            let matched = self
                .rules
                .iter()
                .find_map(|(re, kind)| re.find(rest).filter(|m| !m.is_empty()).map(|m| (m.end(), *kind)));
            let (len, kind) = matched.unwrap_or((first.len_utf8(), None));
            let text = &rest[..len];
            let line = self.line;
            self.line += text.matches('\n').count();
            self.pos += len;
            match kind {
                // espaço em branco
                None if matched.is_some() => continue,
                kind => return Some(Token { kind, text, line }),
            }
        }
    }
}

fn lexer_rules() -> Result<Vec<(Regex, Option<Tok>)>> {
    let table: [(&str, Option<Tok>); 18] = [
        (r"[ \t\n\r]+", None),
        (r"%.*", Some(Tok::Comment)),
        (r"==>", Some(Tok::Arrow)),
        (r"\([[:alpha:]_'·\-]+\)", Some(Tok::Form)),
        (r"<[[:lower:]_'·\-]+>", Some(Tok::Lemma)),
        (r#"\("([A-Za-z]:)?[[:alnum:]_\-./\\]+"\)"#, Some(Tok::FileName)),
        (r#"<"([A-Za-z]:)?[[:alnum:]_\-./\\]+">"#, Some(Tok::FileName)),
        (r"[A-Za-z][\-A-Za-z0-9]*[*]?", Some(Tok::Category)),
        (r"@PRIOR", Some(Tok::Prior)),
        (r"@START", Some(Tok::Start)),
        (r"@HIDDEN", Some(Tok::Hidden)),
        (r"@FLAT", Some(Tok::Flat)),
        (r"@NOTOP", Some(Tok::NoTop)),
        (r"@ONLYTOP", Some(Tok::OnlyTop)),
        (r"\|", Some(Tok::Bar)),
        (r"\.", Some(Tok::Dot)),
        (r",", Some(Tok::Comma)),
        (r"\+", Some(Tok::Governor)),
    ];
    table
        .into_iter()
        .map(|(re, tok)| Ok((Regex::new(&format!("^(?:{re})"))?, tok)))
        .collect()
}

/// Estados do autômato de leitura.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Head,
    Expect,
    Category,
    Qualified,
    Directive,
    DirectiveList,
    Start,
    StartCategory,
    Governor,
}

fn transition(state: State, tok: Tok) -> Option<State> {
    use State as S;
    use Tok as T;
    let next = match (state, tok) {
        (S::Idle, T::Comment) => S::Idle,
        (S::Idle, T::Category) => S::Head,
        (S::Idle, T::Prior | T::Hidden | T::Flat | T::NoTop | T::OnlyTop) => S::Directive,
        (S::Idle, T::Start) => S::Start,
        (S::Head, T::Arrow) => S::Expect,
        (S::Expect, T::Category) => S::Category,
        (S::Expect, T::Governor) => S::Governor,
        (S::Category, T::Comma | T::Bar) => S::Expect,
        (S::Category, T::Dot) => S::Idle,
        (S::Category, T::Lemma | T::Form | T::FileName) => S::Qualified,
        (S::Qualified, T::Comma | T::Bar) => S::Expect,
        (S::Qualified, T::Dot) => S::Idle,
        (S::Directive, T::Category) => S::DirectiveList,
        (S::DirectiveList, T::Category) => S::DirectiveList,
        (S::DirectiveList, T::Dot) => S::Idle,
        (S::Start, T::Category) => S::StartCategory,
        (S::StartCategory, T::Dot) => S::Idle,
        (S::Governor, T::Category) => S::Category,
        _ => return None,
    };
    Some(next)
}

/// Regras indexadas pelo primeiro símbolo do lado direito.
#[derive(Debug, Default)]
pub struct Grammar {
    rules: HashMap<String, Vec<Arc<Rule>>>,
    wild: HashMap<char, Vec<Arc<Rule>>>,
    file_map: HashMap<String, Vec<String>>,
    nonterminals: HashSet<String>,
    prior: HashMap<String, usize>,
    hidden: HashSet<String>,
    flat: HashSet<String>,
    notop: HashSet<String>,
    onlytop: HashSet<String>,
    start: String,
}

/// Regra em construção.
#[derive(Default)]
struct Pending {
    head: String,
    right: Vec<String>,
    category: String,
    governor: Option<usize>,
    wildcard: bool,
    first: bool,
}

impl Grammar {
    pub fn from_file(path: &Path, log: &Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, log)
    }

    /// Lê a gramática de `text`. Listas de palavras referidas por arquivo são
    /// resolvidas relativas a `name`.
    pub fn from_text(name: &str, text: &str, log: &Logger) -> Result<Self> {
        let lexer_rules = lexer_rules()?;
        let mut tokens = Lexer::new(&lexer_rules, text);
        let mut g = Grammar::default();
        let mut p = Pending::default();
        let mut state = State::Idle;
        let mut directive = Tok::Prior;
        let mut next_prior = 1;
        let mut last_line = 1;

        while let Some(tok) = tokens.next() {
            last_line = tok.line;
            let mut error = None;
            let next = tok.kind.and_then(|k| transition(state, k));

            match (next, tok.kind) {
                (None, Some(Tok::Comment)) => {
                    error = Some("unexpected comment, missing dot ending previous rule or directive?".to_string())
                }
                (None, _) => error = Some(format!("unexpected '{}' found", tok.text)),
                (Some(State::Idle), Some(Tok::Dot)) if matches!(state, State::Category | State::Qualified) => {
                    p.right.push(std::mem::take(&mut p.category));
                    g.close_alternative(&mut p, name, tok.line, log);
                }
                (Some(State::Head), _) => {
                    p.head = tok.text.to_string();
                    g.nonterminals.insert(p.head.clone());
                }
                (Some(State::Expect), Some(Tok::Arrow)) => {
                    p.right.clear();
                    p.first = true;
                    p.wildcard = false;
                }
                (Some(State::Expect), Some(Tok::Comma)) => p.right.push(std::mem::take(&mut p.category)),
                (Some(State::Expect), Some(Tok::Bar)) => {
                    p.right.push(std::mem::take(&mut p.category));
                    g.close_alternative(&mut p, name, tok.line, log);
                    p.first = true;
                    p.wildcard = false;
                }
                (Some(State::Category), _) => {
                    p.category = tok.text.to_string();
                    if p.first && p.category.contains('*') {
                        p.wildcard = true;
                    }
                    p.first = false;
                }
                (Some(State::Qualified), kind) => {
                    p.category.push_str(tok.text);
                    if kind == Some(Tok::FileName) {
                        g.load_file_terminal(name, tok.text)?;
                    }
                }
                (Some(State::Directive), Some(kind)) => directive = kind,
                (Some(State::DirectiveList), _) => {
                    let cat = tok.text.to_string();
                    if !g.nonterminals.contains(&cat) {
                        error = Some(format!("terminal symbol '{cat}' not allowed in directive"));
                    } else {
                        match directive {
                            Tok::Prior => {
                                if !g.prior.contains_key(&cat) {
                                    g.prior.insert(cat, next_prior);
                                    next_prior += 1;
                                }
                            }
                            Tok::Hidden => {
                                g.hidden.insert(cat);
                            }
                            Tok::Flat => {
                                g.flat.insert(cat);
                            }
                            Tok::NoTop => {
                                g.notop.insert(cat);
                            }
                            Tok::OnlyTop => {
                                g.onlytop.insert(cat);
                            }
                            _ => {}
                        }
                    }
                }
                (Some(State::Start), _) if !g.start.is_empty() => {
                    error = Some("@START specified more than once".to_string());
                }
                (Some(State::StartCategory), _) => {
                    g.start = tok.text.to_string();
                    g.nonterminals.insert(g.start.clone());
                }
                (Some(State::Governor), _) => p.governor = Some(p.right.len()),
                _ => {}
            }

            state = match error {
                None => next.unwrap_or(State::Idle),
                Some(message) => {
                    log.warn(format!("file {name}, line {}: {message}", tok.line));
                    if tok.kind != Some(Tok::Dot) {
                        for t in tokens.by_ref() {
                            if t.kind == Some(Tok::Dot) {
                                break;
                            }
                        }
                    }
                    p = Pending::default();
                    State::Idle
                }
            };
        }

        if g.start.is_empty() {
            return Err(PlnError::Grammar {
                file: name.to_string(),
                message: "@START symbol not specified".to_string(),
            });
        }
        if g.hidden.contains(&g.start) {
            log.warn(format!("file {name}, line {last_line}: @START symbol cannot be @HIDDEN"));
        }
        if g.notop.contains(&g.start) {
            log.warn(format!("file {name}, line {last_line}: @START symbol cannot be @NOTOP"));
        }
        for x in g.onlytop.intersection(&g.hidden) {
            log.warn(format!("file {name}, line {last_line}: @HIDDEN directive for '{x}' overrides @ONLYTOP"));
        }

        log.debug(format!(
            "grammar loaded: {} nonterminals, start symbol {}",
            g.nonterminals.len(),
            g.start
        ));
        Ok(g)
    }

    fn close_alternative(&mut self, p: &mut Pending, name: &str, line: usize, log: &Logger) {
        let governor = match p.governor.take() {
            Some(gov) => gov,
            None => {
                if p.right.len() != 1 {
                    log.warn(format!(
                        "file {name}, line {line}: non-unary rule with no governor, first component taken as governor"
                    ));
                }
                DEFAULT_GOVERNOR
            }
        };
        let right = std::mem::take(&mut p.right);
        let rule = Arc::new(Rule::new(p.head.clone(), right, governor));
        let Some(first) = rule.right.first() else {
            return;
        };
        if p.wildcard {
            if let Some(c) = first.chars().next() {
                self.wild.entry(c).or_default().push(Arc::clone(&rule));
            }
        }
        self.rules.entry(first.clone()).or_default().push(rule);
    }

    /// `("nomes.dat")`: cada linha `w` do arquivo passa a casar como `(w)`.
    fn load_file_terminal(&mut self, grammar: &str, token: &str) -> Result<()> {
        let (open, close) = if token.starts_with('<') { ("<", ">") } else { ("(", ")") };
        let fname = &token[2..token.len() - 2];
        let text = read_model_file(relative_to(Path::new(grammar), fname))?;
        for word in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let names = self.file_map.entry(format!("{open}{word}{close}")).or_default();
            if !names.iter().any(|n| n == token) {
                names.push(token.to_string());
            }
        }
        Ok(())
    }

    /// Regras cujo lado direito começa por `symbol`.
    pub fn rules_for(&self, symbol: &str) -> &[Arc<Rule>] {
        self.rules.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Regras com curinga no primeiro símbolo, pela sua inicial.
    pub fn wildcard_rules(&self, initial: char) -> &[Arc<Rule>] {
        self.wild.get(&initial).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 0 para terminais com forma, 1 com lema, 2 sem qualificação.
    pub fn specificity(&self, symbol: &str) -> u8 {
        if symbol.contains('(') && symbol.contains(')') {
            0
        } else if symbol.contains('<') && symbol.contains('>') {
            1
        } else {
            2
        }
    }

    /// Posição em `@PRIOR`; quanto menor, mais prioritário.
    pub fn priority(&self, symbol: &str) -> usize {
        self.prior.get(symbol).copied().unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn is_terminal(&self, symbol: &str) -> bool {
        !self.nonterminals.contains(symbol)
    }

    pub fn is_hidden(&self, symbol: &str) -> bool {
        self.hidden.contains(symbol)
    }

    pub fn is_flat(&self, symbol: &str) -> bool {
        self.flat.contains(symbol)
    }

    pub fn is_notop(&self, symbol: &str) -> bool {
        self.notop.contains(symbol)
    }

    pub fn is_onlytop(&self, symbol: &str) -> bool {
        self.onlytop.contains(symbol)
    }

    pub fn start_symbol(&self) -> &str {
        &self.start
    }

    /// Verdadeiro se a palavra `key` (ex: `(paris)`) está na lista `file`.
    pub fn in_file_map(&self, key: &str, file: &str) -> bool {
        self.file_map.get(key).is_some_and(|names| names.iter().any(|n| n == file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, MemorySink};

    const GRAMMAR: &str = "% toy grammar\n\
S ==> sn, +grup-verb, sn .\n\
sn ==> DT, +NN | +NP | NNP, NNP .\n\
grup-verb ==> +VB* .\n\
sp ==> IN(of), +sn .\n\
@PRIOR sn grup-verb .\n\
@HIDDEN sp .\n\
@START S .\n";

    fn grammar() -> Grammar {
        Grammar::from_text("grammar.dat", GRAMMAR, &Logger::null()).unwrap()
    }

    #[test]
    fn test_rules_indexed_by_first_symbol() {
        let g = grammar();
        let dt = g.rules_for("DT");
        assert_eq!(dt.len(), 1);
        assert_eq!(dt[0].head, "sn");
        assert_eq!(dt[0].right, vec!["DT", "NN"]);
        assert_eq!(dt[0].governor, 1);
        assert_eq!(g.rules_for("NP")[0].governor, 0);
        assert_eq!(g.rules_for("IN(of)")[0].right, vec!["IN(of)", "sn"]);
        assert!(g.rules_for("XX").is_empty());
    }

    #[test]
    fn test_wildcard_rules_by_initial() {
        let g = grammar();
        let v = g.wildcard_rules('V');
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].head, "grup-verb");
        assert!(g.wildcard_rules('N').is_empty());
    }

    #[test]
    fn test_directives() {
        let g = grammar();
        assert_eq!(g.start_symbol(), "S");
        assert_eq!(g.priority("sn"), 1);
        assert_eq!(g.priority("grup-verb"), 2);
        assert_eq!(g.priority("S"), DEFAULT_PRIORITY);
        assert!(g.is_hidden("sp"));
        assert!(g.is_terminal("NN"));
        assert!(!g.is_terminal("sn"));
    }

    #[test]
    fn test_specificity() {
        let g = grammar();
        assert_eq!(g.specificity("IN(of)"), 0);
        assert_eq!(g.specificity("VB<go>"), 1);
        assert_eq!(g.specificity("VB"), 2);
    }

    #[test]
    fn test_missing_start_is_fatal() {
        let err = Grammar::from_text("g.dat", "sn ==> NN .\n", &Logger::null()).unwrap_err();
        assert!(matches!(err, PlnError::Grammar { .. }));
    }

    #[test]
    fn test_syntax_error_skips_to_dot() {
        let sink = MemorySink::new();
        let log = Logger::new("grammar", Arc::new(sink.clone()));
        let g = Grammar::from_text("g.dat", "sn ==> ==> NN .\nsn ==> NP .\n@START sn .\n", &log).unwrap();
        assert_eq!(g.rules_for("NP").len(), 1);
        assert!(g.rules_for("NN").is_empty());
        assert!(sink
            .records()
            .iter()
            .any(|r| r.level == Level::Warn && r.message.contains("line 1")));
    }

    #[test]
    fn test_directive_rejects_terminal() {
        let sink = MemorySink::new();
        let log = Logger::new("grammar", Arc::new(sink.clone()));
        let g = Grammar::from_text("g.dat", "sn ==> NP .\n@HIDDEN NP .\n@START sn .\n", &log).unwrap();
        assert!(!g.is_hidden("NP"));
        assert!(sink.records().iter().any(|r| r.message.contains("not allowed in directive")));
    }

    #[test]
    fn test_file_terminals() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cities.dat"), "paris\nlondon\n").unwrap();
        let path = dir.path().join("grammar.dat");
        std::fs::write(&path, "place ==> NP*(\"cities.dat\") .\n@START place .\n").unwrap();
        let g = Grammar::from_file(&path, &Logger::null()).unwrap();
        assert!(g.in_file_map("(paris)", "(\"cities.dat\")"));
        assert!(!g.in_file_map("(rome)", "(\"cities.dat\")"));
        assert_eq!(g.wildcard_rules('N')[0].right, vec!["NP*(\"cities.dat\")"]);
    }
}
