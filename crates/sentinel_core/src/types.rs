//! Definição de tipos/structs de telemetria do capacete.
//!
//! Uma [`Reading`] corresponde a um pacote da serial já convertido em
//! unidades físicas e classificado; é o valor que circula por todo o
//! gateway (live store, hub, persistência, observadores).

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Códigos de estado do firmware
// ──────────────────────────────────────────────

/// Operação normal.
pub const STATE_OK: u8 = 0;
/// Calibração de sensores em andamento.
pub const STATE_CALIBRATING: u8 = 1;
/// Alarme de gás disparado no próprio dispositivo.
pub const STATE_GAS_ALARM: u8 = 2;
/// Bateria em nível crítico reportado pelo firmware.
pub const STATE_LOW_POWER: u8 = 3;
/// Botão SOS pressionado (latch até reset).
pub const STATE_SOS: u8 = 4;
/// Falha interna de sensor.
pub const STATE_FAULT: u8 = 5;

// ──────────────────────────────────────────────
// Pacote bruto
// ──────────────────────────────────────────────

/// Sequência de inteiros extraída de uma linha da serial, ainda sem
/// escala física. Campos além do mínimo são preservados e ignorados.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub fields: Vec<i64>,
}

// ──────────────────────────────────────────────
// Severidade
// ──────────────────────────────────────────────

/// Nível de severidade de uma leitura, em ordem crescente.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    Normal,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Rótulo em minúsculas usado em logs e registros.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

// ──────────────────────────────────────────────
// Leitura normalizada
// ──────────────────────────────────────────────

/// Leitura de um dispositivo em um instante, em unidades físicas.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// Identificador do capacete/operador
    pub device_id: u16,
    /// Timestamp relativo ao dispositivo (ms desde o boot, monotônico)
    pub timestamp_ms: u64,
    /// Aceleração bruta dos 3 eixos (mg)
    pub accel: [i32; 3],
    /// Velocidade angular bruta dos 3 eixos (°/s)
    pub gyro: [i32; 3],
    /// Rolagem (graus)
    pub roll: f32,
    /// Arfagem (graus)
    pub pitch: f32,
    /// Guinada (graus)
    pub yaw: f32,
    /// Concentração de metano (PPM)
    pub methane_ppm: f32,
    /// Valor bruto do sensor de monóxido de carbono
    pub co_raw: i32,
    /// Tensão da bateria (V)
    pub battery_v: f32,
    /// Bateria abaixo do mínimo configurado
    pub battery_low: bool,
    /// Valor bruto do sensor de força da jugular
    pub force: i32,
    /// Capacete vestido na cabeça do operador
    pub worn: bool,
    /// Código de estado do firmware (ver `STATE_*`)
    pub state: u8,
    /// SOS acionado (latch)
    pub sos: bool,
    /// Override manual pelo operador
    pub overridden: bool,
    /// Frequência cardíaca (bpm)
    pub heart_rate_bpm: f32,
    /// Saturação de oxigênio (%)
    pub spo2_pct: f32,
    /// Severidade classificada desta leitura
    pub severity: Severity,
}

// ──────────────────────────────────────────────
// Alerta
// ──────────────────────────────────────────────

/// Registro durável de uma ou mais condições excedidas em uma leitura.
///
/// Criado uma vez por leitura qualificada (sem deduplicação), nunca
/// alterado ou removido pelo gateway; reconhecimento/resolução é
/// responsabilidade da camada de rotas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    /// Dispositivo que originou o alerta
    pub device_id: u16,
    /// Timestamp da leitura que disparou
    pub timestamp_ms: u64,
    /// Severidade computada
    pub severity: Severity,
    /// Mensagem composta: uma linha por condição disparada
    pub message: String,
    /// Referência à leitura persistida
    pub reading_id: u64,
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
