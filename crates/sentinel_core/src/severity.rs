//! Classificação de severidade e composição de alertas.
//!
//! A tabela de thresholds é imutável em tempo de execução: carregada
//! do `config.toml` na partida e nunca recarregada (mudança de limite
//! é um novo deploy, não um ajuste ao vivo).

use crate::config::Thresholds;
use crate::types::{Alert, Reading, Severity, STATE_GAS_ALARM, STATE_LOW_POWER, STATE_SOS};

/// Condição individual que excedeu um threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Methane { ppm: f32, limit: f32 },
    Sos,
    BatteryLow { volts: f32, limit: f32 },
    Spo2Low { pct: f32, limit: f32 },
    HeartLow { bpm: f32, limit: f32 },
    HeartHigh { bpm: f32, limit: f32 },
}

impl Trigger {
    /// Severidade implicada pela condição.
    pub fn severity(&self) -> Severity {
        match self {
            Trigger::Sos | Trigger::Methane { .. } => Severity::Critical,
            Trigger::BatteryLow { .. } | Trigger::Spo2Low { .. } => Severity::High,
            Trigger::HeartLow { .. } | Trigger::HeartHigh { .. } => Severity::Medium,
        }
    }

    /// Linha desta condição na mensagem composta do alerta.
    fn message_line(&self) -> String {
        match self {
            Trigger::Methane { ppm, limit } => {
                format!("Metano em {ppm:.1} PPM (limite {limit:.1} PPM)")
            }
            Trigger::Sos => "SOS acionado no dispositivo".into(),
            Trigger::BatteryLow { volts, limit } => {
                format!("Bateria em {volts:.2} V (mínimo {limit:.2} V)")
            }
            Trigger::Spo2Low { pct, limit } => {
                format!("SpO2 em {pct:.1}% (mínimo {limit:.1}%)")
            }
            Trigger::HeartLow { bpm, limit } => {
                format!("Frequência cardíaca em {bpm:.1} bpm (mínimo {limit:.1})")
            }
            Trigger::HeartHigh { bpm, limit } => {
                format!("Frequência cardíaca em {bpm:.1} bpm (máximo {limit:.1})")
            }
        }
    }
}

/// Avalia uma leitura contra os thresholds.
///
/// Retorna a severidade resultante e os triggers na ordem fixa da
/// mensagem: metano, SOS, bateria, SpO2, FC baixa, FC alta.
///
/// Precedência (primeira que casa vence): SOS ou estado SOS → crítico;
/// metano acima do limite ou estado de alarme de gás → crítico;
/// bateria baixa ou estado de low-power → alto; SpO2 abaixo do mínimo
/// → alto; FC fora da banda [min, max] → médio; senão normal. Gás e
/// bateria simultâneos reportam crítico, nunca alto – desempate
/// deliberado.
pub fn classify(reading: &Reading, thresholds: &Thresholds) -> (Severity, Vec<Trigger>) {
    let mut triggers = Vec::new();

    if reading.methane_ppm > thresholds.methane_crit_ppm || reading.state == STATE_GAS_ALARM {
        triggers.push(Trigger::Methane {
            ppm: reading.methane_ppm,
            limit: thresholds.methane_crit_ppm,
        });
    }
    if reading.sos || reading.state == STATE_SOS {
        triggers.push(Trigger::Sos);
    }
    if reading.battery_low || reading.state == STATE_LOW_POWER {
        triggers.push(Trigger::BatteryLow {
            volts: reading.battery_v,
            limit: thresholds.battery_low_v,
        });
    }
    if reading.spo2_pct < thresholds.spo2_low_pct {
        triggers.push(Trigger::Spo2Low {
            pct: reading.spo2_pct,
            limit: thresholds.spo2_low_pct,
        });
    }
    // Banda inclusiva: exatamente no limite ainda é normal
    if reading.heart_rate_bpm < thresholds.heart_low_bpm {
        triggers.push(Trigger::HeartLow {
            bpm: reading.heart_rate_bpm,
            limit: thresholds.heart_low_bpm,
        });
    } else if reading.heart_rate_bpm > thresholds.heart_high_bpm {
        triggers.push(Trigger::HeartHigh {
            bpm: reading.heart_rate_bpm,
            limit: thresholds.heart_high_bpm,
        });
    }

    let severity = triggers
        .iter()
        .map(Trigger::severity)
        .max()
        .unwrap_or(Severity::Normal);

    (severity, triggers)
}

/// Monta o registro de alerta de uma leitura já persistida.
///
/// `reading_id` é o identificador devolvido pelo sink ao gravar a
/// leitura; o alerta referencia essa leitura para sempre.
pub fn compose_alert(reading: &Reading, triggers: &[Trigger], reading_id: u64) -> Alert {
    let message = triggers
        .iter()
        .map(|t| t.message_line())
        .collect::<Vec<_>>()
        .join("\n");

    Alert {
        device_id: reading.device_id,
        timestamp_ms: reading.timestamp_ms,
        severity: reading.severity,
        message,
        reading_id,
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
