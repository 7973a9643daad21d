//! # Registro (Logging) Injetável
//!
//! Cada componente do pipeline recebe um [`Logger`] na construção, em vez de usar
//! um logger global. O logger carrega o nome do módulo e um [`LogSink`] compartilhado:
//!
//! - [`TracingSink`] (padrão): encaminha para eventos `tracing` com o campo `module`.
//! - [`MemorySink`]: guarda os registros em memória (usado nos testes).
//! - [`NullSink`]: descarta tudo.
//!
//! ```rust
//! use pln_core::logging::{Logger, MemorySink};
//! use std::sync::Arc;
//!
//! let sink = MemorySink::new();
//! let log = Logger::new("tokenizer", Arc::new(sink.clone()));
//! log.warn("caractere ignorado");
//! assert_eq!(sink.warnings().len(), 1);
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Severidade de um registro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Destino dos registros de log.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, module: &str, message: &str);
}

/// Encaminha os registros para o `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, module: &str, message: &str) {
        match level {
            Level::Trace => tracing::trace!(module, "{message}"),
            Level::Debug => tracing::debug!(module, "{message}"),
            Level::Info => tracing::info!(module, "{message}"),
            Level::Warn => tracing::warn!(module, "{message}"),
            Level::Error => tracing::error!(module, "{message}"),
        }
    }
}

/// Descarta todos os registros.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: Level, _module: &str, _message: &str) {}
}

/// Um registro capturado pelo [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: Level,
    pub module: String,
    pub message: String,
}

/// Guarda os registros em memória. Clones compartilham o mesmo buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cópia de todos os registros capturados até agora.
    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apenas os registros de nível `Warn` ou superior.
    pub fn warnings(&self) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level >= Level::Warn)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, module: &str, message: &str) {
        let record = LogRecord {
            level,
            module: module.to_string(),
            message: message.to_string(),
        };
        match self.records.lock() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Handle de log de um componente: nome do módulo + destino compartilhado.
#[derive(Clone)]
pub struct Logger {
    module: &'static str,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(module: &'static str, sink: Arc<dyn LogSink>) -> Self {
        Self { module, sink }
    }

    /// Logger do módulo enviando para o `tracing`.
    pub fn default_for(module: &'static str) -> Self {
        Self::new(module, Arc::new(TracingSink))
    }

    /// Logger silencioso.
    pub fn null() -> Self {
        Self::new("null", Arc::new(NullSink))
    }

    /// Novo logger para outro módulo, com o mesmo destino.
    pub fn for_module(&self, module: &'static str) -> Self {
        Self {
            module,
            sink: Arc::clone(&self.sink),
        }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn log(&self, level: Level, message: impl AsRef<str>) {
        self.sink.log(level, self.module, message.as_ref());
    }

    pub fn trace(&self, message: impl AsRef<str>) {
        self.log(Level::Trace, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::default_for("pln")
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("module", &self.module).finish()
    }
}

/// Instala um subscriber `fmt` global com filtro no formato `EnvFilter` (ex: `"info,pln=debug"`).
///
/// Retorna `false` se já havia um subscriber instalado.
pub fn init_subscriber(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init()
        .is_ok()
}
