//! # Motor de Análise: Orquestrador com Eventos Observáveis
//!
//! O [`Engine`] carrega todos os modelos uma única vez e depois atende documentos
//! em modo somente leitura. Para cada documento o fluxo é:
//!
//! 1. Se houver URL e nenhum conteúdo, o [`ArticleFetcher`] preenche os campos.
//! 2. Título, descrição, palavras-chave e conteúdo são tokenizados e divididos em sentenças.
//! 3. Cada sentença passa por análise morfológica, sentidos, etiquetador HMM e
//!    análise sintática parcial.
//! 4. O UKB ranqueia os sentidos considerando o documento inteiro.
//! 5. A saída é montada: tokens, árvores, triplas, entidades externas e nomes
//!    próprios desconhecidos.
//!
//! O progresso pode ser acompanhado por um canal (`mpsc`) de [`PipelineEvent`].
//! Qualquer erro ou pânico dentro de um documento vira um resultado `Failed`
//! apenas para ele; o motor continua disponível.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::chart::ChartParser;
use crate::collaborators::{ArticleFetcher, EntityExtractor, GlossAnnotator};
use crate::document::{DocumentInput, DocumentOutput, DocumentStatus, SentenceOutput};
use crate::error::{read_model_file, PlnError, Result};
use crate::grammar::Grammar;
use crate::hmm::{HmmOptions, HmmTagger};
use crate::knowledge::KnowledgeBase;
use crate::language::Sentence;
use crate::logging::Logger;
use crate::maco::{Maco, MacoOptions};
use crate::senses::Senses;
use crate::splitter::Splitter;
use crate::tokenizer::Tokenizer;
use crate::ukb::Ukb;

/// Configuração do motor. Nomes de arquivo relativos são resolvidos por
/// [`EngineOptions::resolve`]. Tokenizador e divisor são obrigatórios; os demais
/// arquivos ausentes desligam o estágio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub data_path: PathBuf,
    pub lang: String,
    pub tokenizer_file: Option<String>,
    pub splitter_file: Option<String>,
    pub tagger_file: Option<String>,
    pub grammar_file: Option<String>,
    pub senses_file: Option<String>,
    pub ukb_file: Option<String>,
    pub knowledge_file: Option<String>,
    pub maco: MacoOptions,
    pub hmm: HmmOptions,
    /// Prefixo da etiqueta de nome próprio contada em `unknown_entities`.
    pub proper_noun_tag: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            lang: "en".to_string(),
            tokenizer_file: None,
            splitter_file: None,
            tagger_file: None,
            grammar_file: None,
            senses_file: None,
            ukb_file: None,
            knowledge_file: None,
            maco: MacoOptions::default(),
            hmm: HmmOptions::default(),
            proper_noun_tag: "NP".to_string(),
        }
    }
}

impl EngineOptions {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = read_model_file(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `common*` fica sob `data_path`; os demais nomes sob `data_path/lang`.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() {
            p.to_path_buf()
        } else if name.starts_with("common") {
            self.data_path.join(name)
        } else {
            self.data_path.join(&self.lang).join(name)
        }
    }

    fn path(&self, name: &Option<String>) -> Option<PathBuf> {
        name.as_deref().filter(|n| !n.is_empty()).map(|n| self.resolve(n))
    }
}

/// Eventos emitidos durante a análise de um documento.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    TokenizationDone {
        total: usize,
    },
    SentencesSplit {
        total: usize,
    },
    /// Uma sentença concluiu as etapas por sentença (antes do UKB).
    SentenceAnalyzed {
        index: usize,
        id: String,
        words: usize,
    },
    Done {
        document: Box<DocumentOutput>,
        processing_ms: u64,
    },
    Failed {
        id: String,
        message: String,
    },
}

/// Modelos carregados e colaboradores externos.
///
/// Depois de construído é somente leitura e pode ser compartilhado entre threads.
pub struct Engine {
    options: EngineOptions,
    tokenizer: Option<Tokenizer>,
    splitter: Option<Splitter>,
    maco: Maco,
    senses: Option<Senses>,
    tagger: Option<HmmTagger>,
    parser: Option<ChartParser>,
    ukb: Option<Ukb>,
    knowledge: Option<KnowledgeBase>,
    fetcher: Option<Arc<dyn ArticleFetcher>>,
    extractor: Option<Arc<dyn EntityExtractor>>,
    glosses: Option<Arc<dyn GlossAnnotator>>,
    log: Logger,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Result<Self> {
        Self::with_logger(options, Logger::default_for("engine"))
    }

    /// Carrega cada modelo configurado. Qualquer erro aborta a inicialização.
    pub fn with_logger(options: EngineOptions, log: Logger) -> Result<Self> {
        let start = Instant::now();
        let mut engine = Self::empty(options, log.clone());
        let opts = &engine.options;

        let p = opts
            .path(&opts.tokenizer_file)
            .ok_or_else(|| PlnError::MissingFile("tokenizer_file".into()))?;
        engine.tokenizer = Some(Tokenizer::from_file(&p, log.for_module("tokenizer"))?);
        let p = opts
            .path(&opts.splitter_file)
            .ok_or_else(|| PlnError::MissingFile("splitter_file".into()))?;
        engine.splitter = Some(Splitter::from_file(&p, log.for_module("splitter"))?);
        engine.maco = Maco::new(&opts.maco, &opts.lang, |n| opts.resolve(n), &log.for_module("maco"))?;
        if let Some(p) = opts.path(&opts.senses_file) {
            engine.senses = Some(Senses::from_file(&p, log.for_module("senses"))?);
        }
        if let Some(p) = opts.path(&opts.tagger_file) {
            engine.tagger = Some(HmmTagger::from_file(&p, opts.hmm.clone(), log.for_module("hmm"))?);
        }
        if let Some(p) = opts.path(&opts.grammar_file) {
            let grammar = Grammar::from_file(&p, &log.for_module("grammar"))?;
            engine.parser = Some(ChartParser::new(grammar, log.for_module("chart")));
        }
        if let Some(p) = opts.path(&opts.ukb_file) {
            engine.ukb = Some(Ukb::from_file(&p, log.for_module("ukb"))?);
        }
        if let Some(p) = opts.path(&opts.knowledge_file) {
            engine.knowledge = Some(KnowledgeBase::from_file(&p, &log.for_module("knowledge"))?);
        }

        log.info(format!(
            "engine for '{}' initialized in {} ms",
            engine.options.lang,
            start.elapsed().as_millis()
        ));
        Ok(engine)
    }

    /// Motor sem nenhum estágio; os modelos entram pelos métodos `with_*`.
    pub fn empty(options: EngineOptions, log: Logger) -> Self {
        Self {
            options,
            tokenizer: None,
            splitter: None,
            maco: Maco::default(),
            senses: None,
            tagger: None,
            parser: None,
            ukb: None,
            knowledge: None,
            fetcher: None,
            extractor: None,
            glosses: None,
            log,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_splitter(mut self, splitter: Splitter) -> Self {
        self.splitter = Some(splitter);
        self
    }

    pub fn with_maco(mut self, maco: Maco) -> Self {
        self.maco = maco;
        self
    }

    pub fn with_senses(mut self, senses: Senses) -> Self {
        self.senses = Some(senses);
        self
    }

    pub fn with_tagger(mut self, tagger: HmmTagger) -> Self {
        self.tagger = Some(tagger);
        self
    }

    pub fn with_parser(mut self, parser: ChartParser) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_ukb(mut self, ukb: Ukb) -> Self {
        self.ukb = Some(ukb);
        self
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_article_fetcher(mut self, fetcher: Arc<dyn ArticleFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_entity_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_gloss_annotator(mut self, glosses: Arc<dyn GlossAnnotator>) -> Self {
        self.glosses = Some(glosses);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Analisa um documento e envia o resultado (falho ou não) por `output`.
    pub fn workflow(&self, input: DocumentInput, output: mpsc::Sender<DocumentOutput>) {
        let _ = output.send(self.process(&input, None).0);
    }

    /// Versão bloqueante de [`Engine::workflow`].
    pub fn analyze_document(&self, input: DocumentInput) -> DocumentOutput {
        let (tx, rx) = mpsc::channel();
        let fallback = input.clone();
        self.workflow(input, tx);
        rx.recv()
            .unwrap_or_else(|_| DocumentOutput::failed(next_document_id(), &fallback, "workflow sent no result"))
    }

    /// Como [`Engine::workflow`], mas enviando os eventos de progresso. O último
    /// evento é sempre `Done` ou `Failed`.
    pub fn analyze_streaming(&self, input: DocumentInput, tx: mpsc::Sender<PipelineEvent>) {
        let (document, elapsed) = self.process(&input, Some(&tx));
        let event = match document.status {
            DocumentStatus::Failed => PipelineEvent::Failed {
                id: document.id.clone(),
                message: document.error.clone().unwrap_or_default(),
            },
            _ => PipelineEvent::Done {
                document: Box::new(document),
                processing_ms: elapsed,
            },
        };
        let _ = tx.send(event);
    }

    /// Analisa vários documentos em paralelo sobre os mesmos modelos.
    pub fn analyze_batch(&self, inputs: Vec<DocumentInput>) -> Vec<DocumentOutput> {
        inputs.into_par_iter().map(|d| self.analyze_document(d)).collect()
    }

    /// Tokeniza, divide e analisa `text`, devolvendo as sentenças anotadas.
    pub fn analyze_text(&self, text: &str) -> Result<Vec<Sentence>> {
        self.analyze_sentences(text, None)
    }

    fn process(&self, input: &DocumentInput, events: Option<&mpsc::Sender<PipelineEvent>>) -> (DocumentOutput, u64) {
        let start = Instant::now();
        let id = next_document_id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(&id, input, events)));
        let document = match outcome {
            Ok(Ok(doc)) => {
                self.log.info(format!(
                    "document {id}: {} sentences in {} ms",
                    doc.sentences.len(),
                    start.elapsed().as_millis()
                ));
                doc
            }
            Ok(Err(e)) => {
                self.log.error(format!("document {id} failed: {e}"));
                DocumentOutput::failed(id, input, e.to_string())
            }
            Err(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "panic with unknown payload".to_string()
                };
                let err = PlnError::DocumentFailed(message);
                self.log.error(format!("document {id}: {err}"));
                DocumentOutput::failed(id, input, err.to_string())
            }
        };
        (document, start.elapsed().as_millis() as u64)
    }

    fn run(&self, id: &str, input: &DocumentInput, events: Option<&mpsc::Sender<PipelineEvent>>) -> Result<DocumentOutput> {
        let mut input = input.clone();
        let mut top_image = String::new();

        if !input.url.is_empty() && input.content.is_empty() {
            let fetcher = self
                .fetcher
                .as_ref()
                .ok_or_else(|| PlnError::Collaborator(format!("no article fetcher configured for {}", input.url)))?;
            let article = fetcher.fetch(&input.url)?;
            input.title = article.title;
            input.description = article.description;
            input.keywords = article.keywords;
            input.content = article.cleaned_text;
            top_image = article.top_image;
        }

        let mut sentences = self.analyze_sentences(&input.body(), events)?;
        if let Some(ukb) = &self.ukb {
            ukb.analyze(&mut sentences);
        }

        let mut doc = DocumentOutput::new(id, &input);
        doc.top_image = top_image;

        let mut proper_nouns: BTreeMap<String, u64> = BTreeMap::new();
        for s in &sentences {
            let out = SentenceOutput::from_sentence(s, self.glosses.as_deref(), self.knowledge.as_ref());
            for t in out.tokens.iter().filter(|t| t.tag.starts_with(&self.options.proper_noun_tag)) {
                *proper_nouns.entry(t.form.replace('_', " ")).or_default() += 1;
            }
            doc.sentences.push(out);
        }

        if let Some(extractor) = &self.extractor {
            let text = doc.sentences.iter().map(|s| s.body.as_str()).collect::<Vec<_>>().join(" ");
            doc.entities = extractor.extract(&text);
        }
        let known: BTreeSet<String> = doc.entities.iter().map(|e| e.value.to_lowercase()).collect();
        doc.unknown_entities = proper_nouns
            .into_iter()
            .filter(|(name, _)| !known.contains(&name.to_lowercase()))
            .collect();

        doc.status = DocumentStatus::Done;
        Ok(doc)
    }

    fn analyze_sentences(&self, body: &str, events: Option<&mpsc::Sender<PipelineEvent>>) -> Result<Vec<Sentence>> {
        let emit = |event: PipelineEvent| {
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        };

        let (Some(tokenizer), Some(splitter)) = (&self.tokenizer, &self.splitter) else {
            return Err(PlnError::MissingFile("tokenizer and splitter models".into()));
        };

        let tokens = tokenizer.tokenize(body);
        emit(PipelineEvent::TokenizationDone { total: tokens.len() });

        let mut session = splitter.open_session();
        let mut sentences = splitter.split(&mut session, tokens, true);
        sentences.extend(splitter.close_session(session));
        emit(PipelineEvent::SentencesSplit { total: sentences.len() });

        for (index, s) in sentences.iter_mut().enumerate() {
            self.maco.analyze(s)?;
            if let Some(senses) = &self.senses {
                senses.analyze(s);
            }
            if let Some(tagger) = &self.tagger {
                tagger.analyze(s)?;
            }
            if let Some(parser) = &self.parser {
                parser.analyze(s)?;
            }
            self.log.trace(format!("sentence {} analyzed: {}", s.id, s.body()));
            emit(PipelineEvent::SentenceAnalyzed {
                index,
                id: s.id.clone(),
                words: s.len(),
            });
        }
        Ok(sentences)
    }
}

/// Motor compartilhado com inicialização preguiçosa e única.
///
/// A primeira chamada a [`SharedEngine::get`] carrega os modelos sob um mutex;
/// as seguintes devolvem a mesma instância. Uma falha de carga não fica
/// memorizada e a próxima chamada tenta de novo.
pub struct SharedEngine {
    options: EngineOptions,
    init: Mutex<()>,
    engine: OnceLock<Engine>,
}

impl SharedEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            init: Mutex::new(()),
            engine: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Result<&Engine> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }
        let engine = Engine::new(self.options.clone())?;
        Ok(self.engine.get_or_init(|| engine))
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }
}

fn next_document_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{nanos:x}-{:04}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Article;
    use crate::dictionary::{Dictionary, DictionaryOptions};
    use crate::document::NamedEntity;
    use crate::locutions::Locutions;
    use crate::probability::{Probability, DEFAULT_THRESHOLD};
    use crate::punts::Punts;
    use crate::wdw::Triple;

    const TOKENIZER: &str = "<RegExps>\nWORD 0 [\\p{L}]+\nPUNCT 0 [.,;:!?]\n</RegExps>\n";

    const SPLITTER: &str = "<General>\nAllowBetweenMarkers 0\nMaxWords 0\n</General>\n\
<Markers>\n( )\n</Markers>\n<SentenceEnd>\n. 1\n! 0\n</SentenceEnd>\n";

    const DICT: &str = "<IndexType>\nDB_MAP\n</IndexType>\n<Entries>\n\
john john NP\nsmith smith NP\nwent go VBD\nto to TO\nparis paris NP\n\
saw see VBD\nmary mary NP\nthat that DT that IN\n</Entries>\n";

    const PROBABILITIES: &str = "<SingleTagFreq>\nNP 30\nVBD 20\nTO 10\nDT 10\nIN 10\nNN 10\nFp 10\n</SingleTagFreq>\n\
<UnknownTags>\nNN 50\nVBD 40\nNP 10\n</UnknownTags>\n\
<Theeta>\n0.5\n</Theeta>\n\
<Suffixes>\nd 100 VBD 80 NN 20\ned 100 VBD 90 NN 10\n</Suffixes>\n";

    const HMM: &str = "<Tag>\nNP 0.3\nVBD 0.2\nTO 0.1\nDT 0.1\nIN 0.1\nNN 0.1\nFp 0.09\nx 0.01\n</Tag>\n\
<Bigram>\n0.NP 0.6\nNP.NP 0.2\nNP.VBD 0.5\nVBD.TO 0.3\nVBD.DT 0.4\nVBD.NP 0.3\nTO.NP 0.9\n\
DT.NP 0.8\nIN.NP 0.1\nNP.Fp 0.4\n</Bigram>\n\
<Trigram>\nNP.VBD.DT 0.5\nVBD.DT.NP 0.9\nVBD.IN.NP 0.05\n</Trigram>\n\
<Initial>\n0.NP -0.5\n0.x -6.0\n</Initial>\n\
<Word>\n<UNOBSERVED_WORD> -10.0\n</Word>\n\
<Smoothing>\nc1 0.1\nc2 0.3\nc3 0.6\n</Smoothing>\n";

    const GRAMMAR: &str = "sn-chunk ==> +NP .\nvb-chunk ==> +VB* .\n\
S ==> sn-chunk, +vb-chunk, sn-chunk, Fp .\n@START S .\n";

    struct Gazetteer;

    impl EntityExtractor for Gazetteer {
        fn extract(&self, text: &str) -> Vec<NamedEntity> {
            if text.contains("Paris") {
                vec![NamedEntity::new("LOCATION", 0.9, "Paris")]
            } else {
                vec![]
            }
        }
    }

    struct Panicking;

    impl EntityExtractor for Panicking {
        fn extract(&self, _text: &str) -> Vec<NamedEntity> {
            panic!("extractor exploded")
        }
    }

    struct StaticFetcher;

    impl ArticleFetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> Result<Article> {
            if url.ends_with("404") {
                return Err(PlnError::Collaborator(format!("{url}: not found")));
            }
            Ok(Article {
                title: "News".into(),
                top_image: "img.png".into(),
                cleaned_text: "Mary saw John.".into(),
                ..Article::default()
            })
        }
    }

    fn maco(with_locution: bool) -> Maco {
        let log = Logger::null();
        let mut maco = Maco::default()
            .with_punts(Punts::from_text("DB_MAP\n. . Fp\n<Other> Fz\n", log.clone()))
            .with_dictionary(Dictionary::from_text("dicc.src", DICT, DictionaryOptions::default(), log.clone()).unwrap())
            .with_probability(Probability::from_text("probabilitats.dat", PROBABILITIES, DEFAULT_THRESHOLD, log.clone()).unwrap());
        if with_locution {
            let loc = Locutions::from_text("locucions.dat", "<Multiwords>\njohn_smith john_smith NP\n</Multiwords>\n", log)
                .unwrap();
            maco = maco.with_locutions(loc);
        }
        maco
    }

    fn engine_with(with_locution: bool, hmm: &str) -> Engine {
        let log = Logger::null();
        Engine::empty(EngineOptions::default(), log.clone())
            .with_tokenizer(Tokenizer::from_text("tokenizer.dat", TOKENIZER, log.clone()).unwrap())
            .with_splitter(Splitter::from_text("splitter.dat", SPLITTER, log.clone()).unwrap())
            .with_maco(maco(with_locution))
            .with_tagger(HmmTagger::from_text("tagger.dat", hmm, HmmOptions::default(), log.clone()).unwrap())
            .with_parser(ChartParser::new(Grammar::from_text("grammar.dat", GRAMMAR, &log).unwrap(), log))
            .with_entity_extractor(Arc::new(Gazetteer))
            .with_article_fetcher(Arc::new(StaticFetcher))
    }

    fn engine(with_locution: bool) -> Engine {
        engine_with(with_locution, HMM)
    }

    fn tags(doc: &DocumentOutput) -> Vec<(&str, &str)> {
        doc.sentences[0].tokens.iter().map(|t| (t.form.as_str(), t.tag.as_str())).collect()
    }

    #[test]
    fn test_locution_collapses_proper_noun() {
        let doc = engine(true).analyze_document(DocumentInput::from_content("John Smith went to Paris."));
        assert_eq!(doc.status, DocumentStatus::Done);
        assert_eq!(doc.sentences.len(), 1);
        assert_eq!(
            tags(&doc),
            vec![("John_Smith", "NP"), ("went", "VBD"), ("to", "TO"), ("Paris", "NP"), (".", "Fp")]
        );
        assert_eq!(doc.entities, vec![NamedEntity::new("LOCATION", 0.9, "Paris")]);
        assert_eq!(doc.unknown_entities, BTreeMap::from([("John Smith".to_string(), 1)]));
    }

    #[test]
    fn test_without_locution_names_stay_apart() {
        let doc = engine(false).analyze_document(DocumentInput::from_content("John Smith went to Paris."));
        assert_eq!(doc.sentences[0].tokens.len(), 6);
        assert_eq!(&tags(&doc)[..2], &[("John", "NP"), ("Smith", "NP")]);
        assert_eq!(doc.sentences[0].body, "John Smith went to Paris .");
        assert_eq!(doc.unknown_entities.len(), 2);
        assert!(doc.sentences[0].tree.is_some());
    }

    #[test]
    fn test_forbidden_trigram_is_never_selected() {
        let input = DocumentInput::from_content("John went that Paris.");
        let free = engine(false).analyze_document(input.clone());
        assert_eq!(tags(&free)[2], ("that", "DT"));

        let forbidden = format!("{HMM}<Forbidden>\n*.DT.NP\n</Forbidden>\n");
        let doc = engine_with(false, &forbidden).analyze_document(input);
        assert_eq!(tags(&doc)[2], ("that", "IN"));
        assert_eq!(tags(&doc)[3], ("Paris", "NP"));
    }

    #[test]
    fn test_unknown_word_uses_guesser() {
        let sentences = engine(false).analyze_text("John blorfed.").unwrap();
        let w = &sentences[0].words[1];
        assert_eq!(w.form, "blorfed");
        assert!(!w.in_dict);
        assert!(!w.analyses.is_empty());
        let total: f64 = w.analyses.iter().map(|a| a.prob).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(w.analyses.iter().all(|a| a.lemma == "blorfed"));
    }

    #[test]
    fn test_full_parse_yields_triple() {
        let doc = engine(false).analyze_document(DocumentInput::from_content("John saw Mary."));
        let s = &doc.sentences[0];
        assert_eq!(
            s.triples,
            vec![Triple {
                who: "John".into(),
                did: "saw".into(),
                what: "Mary".into(),
            }]
        );
        assert!(s.tree.as_deref().unwrap().starts_with("S_[\n"));
    }

    #[test]
    fn test_url_is_fetched_when_content_is_empty() {
        let doc = engine(false).analyze_document(DocumentInput::from_url("http://example.org/a"));
        assert_eq!(doc.status, DocumentStatus::Done);
        assert_eq!(doc.title, "News");
        assert_eq!(doc.top_image, "img.png");
        assert_eq!(doc.sentences[0].body, "News Mary saw John .");
    }

    #[test]
    fn test_failures_stay_inside_one_document() {
        let e = engine(false);
        let doc = e.analyze_document(DocumentInput::from_url("http://example.org/404"));
        assert!(doc.is_failed());
        assert!(doc.error.as_deref().unwrap().contains("not found"));

        let boom = engine(false).with_entity_extractor(Arc::new(Panicking));
        let doc = boom.analyze_document(DocumentInput::from_content("John saw Mary."));
        assert!(doc.is_failed());
        assert!(doc.error.as_deref().unwrap().contains("extractor exploded"));

        let doc = e.analyze_document(DocumentInput::from_content("John saw Mary."));
        assert_eq!(doc.status, DocumentStatus::Done);
    }

    #[test]
    fn test_missing_probabilities_fails_document() {
        let log = Logger::null();
        let e = Engine::empty(EngineOptions::default(), log.clone())
            .with_tokenizer(Tokenizer::from_text("tokenizer.dat", TOKENIZER, log.clone()).unwrap())
            .with_splitter(Splitter::from_text("splitter.dat", SPLITTER, log.clone()).unwrap())
            .with_tagger(HmmTagger::from_text("tagger.dat", HMM, HmmOptions::default(), log).unwrap());
        let doc = e.analyze_document(DocumentInput::from_content("John saw Mary."));
        assert!(doc.is_failed());
    }

    #[test]
    fn test_streaming_events_order() {
        let (tx, rx) = mpsc::channel();
        engine(false).analyze_streaming(DocumentInput::from_content("John saw Mary. Mary saw John!"), tx);
        let events: Vec<PipelineEvent> = rx.try_iter().collect();

        assert!(matches!(events[0], PipelineEvent::TokenizationDone { total: 8 }));
        assert!(matches!(events[1], PipelineEvent::SentencesSplit { total: 2 }));
        let analyzed = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::SentenceAnalyzed { .. }))
            .count();
        assert_eq!(analyzed, 2);
        let Some(PipelineEvent::Done { document, .. }) = events.last() else {
            panic!("last event must be Done");
        };
        assert_eq!(document.sentences.len(), 2);

        let json = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(json["type"], "TokenizationDone");
        assert_eq!(json["data"]["total"], 8);
    }

    #[test]
    fn test_streaming_failure_event() {
        let (tx, rx) = mpsc::channel();
        engine(false).analyze_streaming(DocumentInput::from_url("http://example.org/404"), tx);
        let last = rx.try_iter().last().unwrap();
        assert!(matches!(last, PipelineEvent::Failed { .. }));
    }

    #[test]
    fn test_batch_runs_documents_independently() {
        let e = engine(true);
        let inputs = vec![
            DocumentInput::from_content("John Smith went to Paris."),
            DocumentInput::from_url("http://example.org/404"),
            DocumentInput::from_content("Mary saw John."),
        ];
        let out = e.analyze_batch(inputs);
        let status: Vec<DocumentStatus> = out.iter().map(|d| d.status).collect();
        assert_eq!(status, vec![DocumentStatus::Done, DocumentStatus::Failed, DocumentStatus::Done]);
        let ids: BTreeSet<&str> = out.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_resolve_paths() {
        let opts = EngineOptions {
            data_path: PathBuf::from("/data"),
            lang: "es".into(),
            ..EngineOptions::default()
        };
        assert_eq!(opts.resolve("tagger.dat"), PathBuf::from("/data/es/tagger.dat"));
        assert_eq!(opts.resolve("common/punct.dat"), PathBuf::from("/data/common/punct.dat"));
        assert_eq!(opts.resolve("/abs/x.dat"), PathBuf::from("/abs/x.dat"));
    }

    #[test]
    fn test_engine_loads_configured_files() {
        let dir = tempfile::tempdir().unwrap();
        let lang = dir.path().join("en");
        std::fs::create_dir_all(&lang).unwrap();
        std::fs::create_dir_all(dir.path().join("common")).unwrap();
        std::fs::write(lang.join("tokenizer.dat"), TOKENIZER).unwrap();
        std::fs::write(lang.join("splitter.dat"), SPLITTER).unwrap();
        std::fs::write(lang.join("dicc.src"), DICT).unwrap();
        std::fs::write(lang.join("probabilitats.dat"), PROBABILITIES).unwrap();
        std::fs::write(lang.join("tagger.dat"), HMM).unwrap();
        std::fs::write(dir.path().join("common").join("punct.dat"), "DB_MAP\n. . Fp\n").unwrap();

        let options = EngineOptions {
            data_path: dir.path().to_path_buf(),
            lang: "en".into(),
            tokenizer_file: Some("tokenizer.dat".into()),
            splitter_file: Some("splitter.dat".into()),
            tagger_file: Some("tagger.dat".into()),
            maco: MacoOptions {
                punctuation_file: Some("common/punct.dat".into()),
                dictionary_file: Some("dicc.src".into()),
                probability_file: Some("probabilitats.dat".into()),
                ..MacoOptions::default()
            },
            ..EngineOptions::default()
        };
        let json = dir.path().join("engine.json");
        std::fs::write(&json, serde_json::to_string(&options).unwrap()).unwrap();
        let loaded = EngineOptions::from_json_file(&json).unwrap();
        assert_eq!(loaded, options);

        let shared = SharedEngine::new(loaded);
        assert!(!shared.is_initialized());
        let first = shared.get().unwrap();
        let second = shared.get().unwrap();
        assert!(std::ptr::eq(first, second));

        let doc = first.analyze_document(DocumentInput::from_content("Mary saw John."));
        assert_eq!(doc.status, DocumentStatus::Done);
        let tags: Vec<&str> = doc.sentences[0].tokens.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tags, vec!["NP", "VBD", "NP", "Fp"]);
    }

    #[test]
    fn test_engine_requires_tokenizer_and_splitter() {
        let err = Engine::with_logger(EngineOptions::default(), Logger::null()).err().unwrap();
        assert!(matches!(err, PlnError::MissingFile(ref f) if f == "tokenizer_file"));

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("en")).unwrap();
        std::fs::write(dir.path().join("en").join("tokenizer.dat"), TOKENIZER).unwrap();
        let options = EngineOptions {
            data_path: dir.path().to_path_buf(),
            tokenizer_file: Some("tokenizer.dat".into()),
            ..EngineOptions::default()
        };
        let err = Engine::with_logger(options, Logger::null()).err().unwrap();
        assert!(matches!(err, PlnError::MissingFile(ref f) if f == "splitter_file"));

        let bare = Engine::empty(EngineOptions::default(), Logger::null());
        assert!(bare.analyze_text("El gato come pescado.").is_err());
        let doc = bare.analyze_document(DocumentInput::from_content("El gato come pescado."));
        assert!(doc.is_failed());
    }

    #[test]
    fn test_missing_model_file_aborts_initialization() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("en")).unwrap();
        std::fs::write(dir.path().join("en").join("tokenizer.dat"), TOKENIZER).unwrap();
        std::fs::write(dir.path().join("en").join("splitter.dat"), SPLITTER).unwrap();
        let options = EngineOptions {
            data_path: dir.path().to_path_buf(),
            tokenizer_file: Some("tokenizer.dat".into()),
            splitter_file: Some("splitter.dat".into()),
            tagger_file: Some("nope.dat".into()),
            ..EngineOptions::default()
        };
        assert!(Engine::new(options.clone()).is_err());
        let shared = SharedEngine::new(options);
        assert!(shared.get().is_err());
        assert!(!shared.is_initialized());
    }
}
