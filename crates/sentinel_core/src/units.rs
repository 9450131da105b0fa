//! Conversão de pacotes brutos em unidades físicas.
//!
//! Fatores de escala fixos do firmware:
//!
//! | Campo           | Escala | Unidade final |
//! |-----------------|--------|---------------|
//! | accel / gyro    | 1      | mg / °/s      |
//! | roll/pitch/yaw  | ÷100   | graus         |
//! | metano          | ÷10    | PPM           |
//! | bateria         | ÷1000  | V             |
//! | FC / SpO2       | ÷10    | bpm / %       |

use crate::config::Thresholds;
use crate::packet::{
    IDX_ACCEL_X, IDX_ACCEL_Y, IDX_ACCEL_Z, IDX_BATTERY, IDX_CO, IDX_DEVICE_ID, IDX_FORCE,
    IDX_GYRO_X, IDX_GYRO_Y, IDX_GYRO_Z, IDX_HEART_RATE, IDX_METHANE, IDX_OVERRIDE, IDX_PITCH,
    IDX_ROLL, IDX_SOS, IDX_SPO2, IDX_STATE, IDX_TIMESTAMP, IDX_WORN, IDX_YAW,
};
use crate::types::{RawPacket, Reading, Severity};

/// Divisor de ângulos (centésimos de grau).
pub const ANGLE_DIV: f32 = 100.0;
/// Divisor de metano (décimos de PPM).
pub const METHANE_DIV: f32 = 10.0;
/// Divisor de bateria (milivolts).
pub const BATTERY_DIV: f32 = 1000.0;
/// Divisor de vitais (décimos de bpm / décimos de %).
pub const VITALS_DIV: f32 = 10.0;

// ──────────────────────────────────────────────
// Vitais sintéticos
// ──────────────────────────────────────────────

/// Oscilador triangular determinístico dentro de uma banda fixa.
#[derive(Debug, Clone)]
struct Oscillator {
    value: f32,
    step: f32,
    min: f32,
    max: f32,
    rising: bool,
}

impl Oscillator {
    fn new(min: f32, max: f32, step: f32) -> Self {
        Self {
            value: min,
            step,
            min,
            max,
            rising: true,
        }
    }

    /// Próximo valor da onda; a direção inverte exatamente nas bordas.
    fn next(&mut self) -> f32 {
        let v = self.value;
        if self.rising {
            self.value += self.step;
            if self.value >= self.max {
                self.value = self.max;
                self.rising = false;
            }
        } else {
            self.value -= self.step;
            if self.value <= self.min {
                self.value = self.min;
                self.rising = true;
            }
        }
        v
    }
}

/// Gerador de vitais sintéticos para capacetes sem o módulo de pulso.
///
/// Parte da frota sai de fábrica sem o sensor MAX30102; o firmware
/// emite zero (ou negativo) nesses campos. Propagar o zero dispararia
/// alerta de SpO2 em todo pacote, então o normalizador substitui por
/// uma onda triangular dentro da faixa de repouso.
///
/// O estado do oscilador vive nesta struct (injetável), não em
/// globals: cada teste instancia a sua.
#[derive(Debug, Clone)]
pub struct VitalsSynth {
    heart: Oscillator,
    spo2: Oscillator,
}

/// Banda da FC sintética (bpm).
pub const SYNTH_HEART_MIN: f32 = 72.0;
pub const SYNTH_HEART_MAX: f32 = 84.0;
/// Passo da FC sintética por leitura (bpm).
pub const SYNTH_HEART_STEP: f32 = 0.4;
/// Banda do SpO2 sintético (%).
pub const SYNTH_SPO2_MIN: f32 = 95.5;
pub const SYNTH_SPO2_MAX: f32 = 99.0;
/// Passo do SpO2 sintético por leitura (%).
pub const SYNTH_SPO2_STEP: f32 = 0.1;

impl VitalsSynth {
    pub fn new() -> Self {
        Self {
            heart: Oscillator::new(SYNTH_HEART_MIN, SYNTH_HEART_MAX, SYNTH_HEART_STEP),
            spo2: Oscillator::new(SYNTH_SPO2_MIN, SYNTH_SPO2_MAX, SYNTH_SPO2_STEP),
        }
    }

    /// Próxima FC sintética (bpm).
    pub fn next_heart(&mut self) -> f32 {
        self.heart.next()
    }

    /// Próximo SpO2 sintético (%).
    pub fn next_spo2(&mut self) -> f32 {
        self.spo2.next()
    }
}

impl Default for VitalsSynth {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────────────────────────────────
// Normalizador
// ──────────────────────────────────────────────

/// Converte [`RawPacket`] em [`Reading`] aplicando os fatores de escala.
///
/// Mantém o estado dos vitais sintéticos entre leituras, por isso é
/// uma struct e não uma função livre.
#[derive(Debug, Default)]
pub struct Normalizer {
    synth: VitalsSynth,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_synth(synth: VitalsSynth) -> Self {
        Self { synth }
    }

    /// Normaliza um pacote com ≥21 campos (garantido pelo decodificador).
    ///
    /// A severidade sai como `Normal`; o classificador preenche depois.
    pub fn normalize(&mut self, pkt: &RawPacket, thresholds: &Thresholds) -> Reading {
        let f = &pkt.fields;

        let battery_v = f[IDX_BATTERY] as f32 / BATTERY_DIV;

        let raw_heart = f[IDX_HEART_RATE];
        let heart_rate_bpm = if raw_heart <= 0 {
            // Sensor ausente: sentinela ≤ 0
            self.synth.next_heart()
        } else {
            raw_heart as f32 / VITALS_DIV
        };

        let raw_spo2 = f[IDX_SPO2];
        let spo2_pct = if raw_spo2 <= 0 {
            self.synth.next_spo2()
        } else {
            raw_spo2 as f32 / VITALS_DIV
        };

        Reading {
            device_id: f[IDX_DEVICE_ID] as u16,
            timestamp_ms: f[IDX_TIMESTAMP].max(0) as u64,
            accel: [
                f[IDX_ACCEL_X] as i32,
                f[IDX_ACCEL_Y] as i32,
                f[IDX_ACCEL_Z] as i32,
            ],
            gyro: [
                f[IDX_GYRO_X] as i32,
                f[IDX_GYRO_Y] as i32,
                f[IDX_GYRO_Z] as i32,
            ],
            roll: f[IDX_ROLL] as f32 / ANGLE_DIV,
            pitch: f[IDX_PITCH] as f32 / ANGLE_DIV,
            yaw: f[IDX_YAW] as f32 / ANGLE_DIV,
            methane_ppm: f[IDX_METHANE] as f32 / METHANE_DIV,
            co_raw: f[IDX_CO] as i32,
            battery_v,
            battery_low: battery_v <= thresholds.battery_low_v,
            force: f[IDX_FORCE] as i32,
            worn: f[IDX_WORN] != 0,
            state: f[IDX_STATE].clamp(0, u8::MAX as i64) as u8,
            sos: f[IDX_SOS] != 0,
            overridden: f[IDX_OVERRIDE] != 0,
            heart_rate_bpm,
            spo2_pct,
            severity: Severity::Normal,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::MIN_FIELDS;

    /// Pacote com todos os campos zerados exceto os passados.
    fn packet_with(overrides: &[(usize, i64)]) -> RawPacket {
        let mut fields = vec![0i64; MIN_FIELDS];
        // Vitais presentes por padrão para não ativar o sintético
        fields[IDX_HEART_RATE] = 750;
        fields[IDX_SPO2] = 980;
        for &(idx, v) in overrides {
            fields[idx] = v;
        }
        RawPacket { fields }
    }

    #[test]
    fn methane_scale() {
        let mut n = Normalizer::new();
        let r = n.normalize(&packet_with(&[(IDX_METHANE, 152)]), &Thresholds::default());
        assert_eq!(r.methane_ppm, 15.2);
    }

    #[test]
    fn battery_scale_and_low_flag_at_boundary() {
        let mut n = Normalizer::new();
        let thr = Thresholds::default();

        // 3320 mV → 3.32 V, exatamente no limite: já é "low"
        let r = n.normalize(&packet_with(&[(IDX_BATTERY, 3320)]), &thr);
        assert_eq!(r.battery_v, 3.32);
        assert!(r.battery_low);

        // 1 mV acima do limite: ok
        let r = n.normalize(&packet_with(&[(IDX_BATTERY, 3321)]), &thr);
        assert!(!r.battery_low);
    }

    #[test]
    fn angle_and_vitals_scales() {
        let mut n = Normalizer::new();
        let r = n.normalize(
            &packet_with(&[
                (IDX_ROLL, 125),
                (IDX_PITCH, -50),
                (IDX_YAW, 17890),
                (IDX_HEART_RATE, 785),
                (IDX_SPO2, 972),
            ]),
            &Thresholds::default(),
        );
        assert_eq!(r.roll, 1.25);
        assert_eq!(r.pitch, -0.5);
        assert_eq!(r.yaw, 178.9);
        assert_eq!(r.heart_rate_bpm, 78.5);
        assert_eq!(r.spo2_pct, 97.2);
    }

    #[test]
    fn flags_and_raw_fields() {
        let mut n = Normalizer::new();
        let r = n.normalize(
            &packet_with(&[
                (IDX_DEVICE_ID, 7),
                (IDX_WORN, 1),
                (IDX_SOS, 1),
                (IDX_OVERRIDE, 1),
                (IDX_CO, 310),
                (IDX_FORCE, 512),
                (IDX_STATE, 4),
            ]),
            &Thresholds::default(),
        );
        assert_eq!(r.device_id, 7);
        assert!(r.worn);
        assert!(r.sos);
        assert!(r.overridden);
        assert_eq!(r.co_raw, 310);
        assert_eq!(r.force, 512);
        assert_eq!(r.state, 4);
    }

    #[test]
    fn missing_vitals_get_synthetic_values() {
        let mut n = Normalizer::new();
        let thr = Thresholds::default();
        let r = n.normalize(
            &packet_with(&[(IDX_HEART_RATE, 0), (IDX_SPO2, -1)]),
            &thr,
        );
        // Primeira leitura sintética começa no piso da banda
        assert_eq!(r.heart_rate_bpm, SYNTH_HEART_MIN);
        assert_eq!(r.spo2_pct, SYNTH_SPO2_MIN);
        // Dentro da banda de repouso: não dispara alerta
        assert!(r.spo2_pct >= thr.spo2_low_pct);
    }

    #[test]
    fn synthetic_wave_reverses_exactly_at_band_edges() {
        let mut synth = VitalsSynth::new();
        let steps = ((SYNTH_HEART_MAX - SYNTH_HEART_MIN) / SYNTH_HEART_STEP) as usize;

        let mut values = Vec::new();
        // Duas idas e voltas completas
        for _ in 0..(steps * 4 + 1) {
            values.push(synth.next_heart());
        }

        let max = values.iter().cloned().fold(f32::MIN, f32::max);
        let min = values.iter().cloned().fold(f32::MAX, f32::min);
        assert_eq!(max, SYNTH_HEART_MAX);
        assert_eq!(min, SYNTH_HEART_MIN);

        // Após atingir o teto, a série desce
        let peak = values
            .iter()
            .position(|&v| v == SYNTH_HEART_MAX)
            .unwrap();
        assert!(values[peak + 1] < SYNTH_HEART_MAX);
        // E após voltar ao piso, sobe de novo
        let trough = peak
            + values[peak..]
                .iter()
                .position(|&v| v == SYNTH_HEART_MIN)
                .unwrap();
        assert!(values[trough + 1] > SYNTH_HEART_MIN);
    }

    #[test]
    fn synthetic_is_deterministic() {
        let mut a = VitalsSynth::new();
        let mut b = VitalsSynth::new();
        for _ in 0..100 {
            assert_eq!(a.next_heart(), b.next_heart());
            assert_eq!(a.next_spo2(), b.next_spo2());
        }
    }
}
