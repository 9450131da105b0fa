//! Decodificador do formato de linha emitido pelo firmware do capacete.
//!
//! O dispositivo emite texto linha a linha pela serial:
//!
//! ```text
//! TLM:[7, 151230, 12, -3, 998, 1, 0, -2, 125, -50, 17890, 152, 310, 3870, 512, 1, 0, 0, 0, 785, 972]
//! ```
//!
//! - Prefixo fixo `TLM:` identifica a linha como pacote
//! - Lista entre colchetes, separada por vírgulas, com ≥21 inteiros
//! - Literais de ponto flutuante são aceitos e truncados (`12.0` → 12)
//!
//! Linha sem o prefixo ou sem colchetes balanceados não é pacote e é
//! ignorada sem erro. Linha com o prefixo mas com um elemento que não
//! parseia (ou com menos de 21 campos) é um pacote malformado: a linha
//! inteira é descartada com erro – nunca um pacote parcial.
//!
//! Função pura, sem efeitos colaterais; logging/contadores ficam com o
//! chamador.

use crate::types::RawPacket;

/// Prefixo que identifica uma linha de pacote.
pub const PACKET_MARKER: &str = "TLM:";

/// Número mínimo de campos de um pacote válido.
pub const MIN_FIELDS: usize = 21;

// Índices dos campos na ordem fixa do firmware.
pub const IDX_DEVICE_ID: usize = 0;
pub const IDX_TIMESTAMP: usize = 1;
pub const IDX_ACCEL_X: usize = 2;
pub const IDX_ACCEL_Y: usize = 3;
pub const IDX_ACCEL_Z: usize = 4;
pub const IDX_GYRO_X: usize = 5;
pub const IDX_GYRO_Y: usize = 6;
pub const IDX_GYRO_Z: usize = 7;
pub const IDX_ROLL: usize = 8;
pub const IDX_PITCH: usize = 9;
pub const IDX_YAW: usize = 10;
pub const IDX_METHANE: usize = 11;
pub const IDX_CO: usize = 12;
pub const IDX_BATTERY: usize = 13;
pub const IDX_FORCE: usize = 14;
pub const IDX_WORN: usize = 15;
pub const IDX_STATE: usize = 16;
pub const IDX_SOS: usize = 17;
pub const IDX_OVERRIDE: usize = 18;
pub const IDX_HEART_RATE: usize = 19;
pub const IDX_SPO2: usize = 20;

/// Erros de decodificação de pacote.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("Pacote com {0} campos (mínimo {MIN_FIELDS})")]
    TooFewFields(usize),

    #[error("Campo {index} inválido: {text:?}")]
    BadField { index: usize, text: String },
}

/// Decodifica uma linha da serial.
///
/// - `Ok(None)` – a linha não é um pacote (sem prefixo/colchetes)
/// - `Ok(Some(pkt))` – pacote válido com ≥21 campos
/// - `Err(_)` – linha com cara de pacote mas malformada
pub fn parse_line(line: &str) -> Result<Option<RawPacket>, PacketError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(PACKET_MARKER) else {
        return Ok(None);
    };
    let Some(open) = rest.find('[') else {
        return Ok(None);
    };
    let Some(close) = rest.rfind(']') else {
        return Ok(None);
    };
    if close < open {
        return Ok(None);
    }

    let body = &rest[open + 1..close];
    let mut fields = Vec::with_capacity(MIN_FIELDS);
    for (index, part) in body.split(',').enumerate() {
        let text = part.trim();
        // O firmware emite valores como `12.0`; parseia como float e trunca.
        let value = text
            .parse::<f64>()
            .map_err(|_| PacketError::BadField {
                index,
                text: text.into(),
            })? as i64;
        fields.push(value);
    }

    if fields.len() < MIN_FIELDS {
        return Err(PacketError::TooFewFields(fields.len()));
    }

    Ok(Some(RawPacket { fields }))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
