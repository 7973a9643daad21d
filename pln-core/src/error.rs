//! # Erros do Pipeline
//!
//! Taxonomia de erros usada por todos os carregadores de modelos e pelas etapas de análise.
//!
//! - **Fatais de configuração**: arquivo ausente, seção malformada, gramática sem `@START`.
//!   Abortam a inicialização do motor inteiro.
//! - **Recuperáveis por linha**: não aparecem aqui. São registrados como `warn` pelo
//!   [`Logger`](crate::logging::Logger) do componente e a linha é ignorada.
//! - **Falhas por documento**: erros internos durante a análise de um documento
//!   (ex: chart inconsistente). São convertidos em resultado "falho" pelo `Workflow`.

use std::path::PathBuf;

/// Result padrão do crate, com [`PlnError`] como erro default.
pub type Result<T, E = PlnError> = std::result::Result<T, E>;

/// Erro do pipeline de linguagem natural.
#[derive(Debug, thiserror::Error)]
pub enum PlnError {
    /// Falha de E/S ao abrir um arquivo de modelo.
    #[error("error opening file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Um arquivo obrigatório não foi informado na configuração.
    #[error("missing required file: {0}")]
    MissingFile(String),

    /// Conteúdo malformado em um arquivo de configuração.
    #[error("{file}:{line}: {message}")]
    Config {
        file: String,
        line: usize,
        message: String,
    },

    /// Seção desconhecida aberta/fechada em um arquivo seccionado.
    #[error("{file}: unknown section {section}")]
    UnknownSection { file: String, section: String },

    /// Gramática inválida (ex: `@START` ausente).
    #[error("grammar {file}: {message}")]
    Grammar { file: String, message: String },

    /// Uma palavra chegou ao etiquetador sem probabilidades lexicais.
    #[error("no lexical probabilities for word '{word}': run the probability module first")]
    MissingProbabilities { word: String },

    /// Componente de contração sem análise no dicionário.
    #[error("contraction component '{form}' of tag '{tag}' not found in dictionary")]
    MissingComponent { form: String, tag: String },

    /// Nenhuma aresta inativa cobre uma célula do chart.
    #[error("inconsistent chart: no edge covers span ({len},{start})")]
    InconsistentChart { len: usize, start: usize },

    /// Falha irrecuperável no processamento de um documento.
    #[error("document analysis failed: {0}")]
    DocumentFailed(String),

    /// Erro do colaborador externo (crawler, NER externo).
    #[error("external collaborator failed: {0}")]
    Collaborator(String),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PlnError {
    /// Atalho para erros de configuração com arquivo e linha.
    pub fn config(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        PlnError::Config {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

/// Lê um arquivo de modelo inteiro, anexando o caminho ao erro de E/S.
pub fn read_model_file(path: impl Into<PathBuf>) -> Result<String> {
    let path = path.into();
    std::fs::read_to_string(&path).map_err(|source| PlnError::Io { path, source })
}
