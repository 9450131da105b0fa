//! # Sentinel Core
//!
//! Crate compartilhada que define o formato de pacote do capacete,
//! a normalização de unidades físicas, as regras de severidade, o
//! protocolo de frames para observadores e a configuração TOML do
//! sistema Sentinela.
//!
//! ## Módulos
//! - [`types`] – Structs de telemetria (leitura normalizada, alerta…)
//! - [`packet`] – Decodificação das linhas emitidas pela serial
//! - [`units`] – Fatores de escala e vitais sintéticos
//! - [`severity`] – Classificação por thresholds e composição de alertas
//! - [`protocol`] – Frames binários com magic byte para observadores
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod packet;
pub mod units;
pub mod severity;
pub mod protocol;
pub mod config;

// Re-exports convenientes
pub use config::AppConfig;
pub use packet::parse_line;
pub use protocol::{decode_frame, encode_frame, FRAME_VERSION};
pub use types::{Alert, RawPacket, Reading, Severity};
