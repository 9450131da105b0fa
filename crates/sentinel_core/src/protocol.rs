//! Protocolo de frames para observadores (dashboards, visualizador 3D).
//!
//! Cada leitura republicada pelo hub vai para os assinantes TCP como
//! um frame binário:
//!
//! ```text
//! ┌──────────┬─────────┬──────────┬──────────────┐
//! │ Magic(1) │ Ver.(1) │ Len(4BE) │ Payload (N)  │
//! └──────────┴─────────┴──────────┴──────────────┘
//! ```
//!
//! - Magic byte `0x53` ('S') identifica frame Sentinela
//! - Versão do protocolo (1 byte)
//! - Tamanho do payload (u32 big-endian)
//! - Payload: [`Reading`] serializado com bincode
//!
//! O prefixo de tamanho existe porque TCP é um stream de bytes; no
//! UDP o datagrama delimitaria o frame de graça.

use crate::types::Reading;

/// Magic byte que identifica frames do protocolo Sentinela.
pub const MAGIC_BYTE: u8 = 0x53; // 'S'

/// Versão atual do protocolo.
pub const FRAME_VERSION: u8 = 1;

/// Tamanho do header (magic + version + len).
pub const HEADER_SIZE: usize = 6;

/// Tamanho máximo aceito de payload; acima disso o frame é lixo.
pub const MAX_PAYLOAD: usize = 64 * 1024;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame muito curto ({0} bytes, mínimo {HEADER_SIZE})")]
    TooShort(usize),

    #[error("Magic byte inválido: 0x{0:02X} (esperado 0x{MAGIC_BYTE:02X})")]
    InvalidMagic(u8),

    #[error("Versão incompatível: {0} (suportada: {FRAME_VERSION})")]
    VersionMismatch(u8),

    #[error("Payload de {0} bytes excede o máximo de {MAX_PAYLOAD}")]
    PayloadTooLarge(usize),

    #[error("Frame incompleto: payload de {expected} bytes, {got} disponíveis")]
    Incomplete { expected: usize, got: usize },

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

/// Codifica uma [`Reading`] em um frame pronto para `write_all`.
pub fn encode_frame(reading: &Reading) -> Result<Vec<u8>, ProtocolError> {
    let body =
        bincode::serialize(reading).map_err(|e| ProtocolError::Serialize(e.to_string()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.push(MAGIC_BYTE);
    frame.push(FRAME_VERSION);
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);

    Ok(frame)
}

/// Decodifica o primeiro frame de `data`.
///
/// Retorna a leitura e quantos bytes foram consumidos, para que o
/// cliente processe um buffer acumulado frame a frame.
pub fn decode_frame(data: &[u8]) -> Result<(Reading, usize), ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Err(ProtocolError::TooShort(data.len()));
    }

    let magic = data[0];
    if magic != MAGIC_BYTE {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let version = data[1];
    if version != FRAME_VERSION {
        return Err(ProtocolError::VersionMismatch(version));
    }

    let len = u32::from_be_bytes([data[2], data[3], data[4], data[5]]) as usize;
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge(len));
    }

    let available = data.len() - HEADER_SIZE;
    if available < len {
        return Err(ProtocolError::Incomplete {
            expected: len,
            got: available,
        });
    }

    let body = &data[HEADER_SIZE..HEADER_SIZE + len];
    let reading =
        bincode::deserialize(body).map_err(|e| ProtocolError::Deserialize(e.to_string()))?;

    Ok((reading, HEADER_SIZE + len))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn sample_reading() -> Reading {
        Reading {
            device_id: 12,
            timestamp_ms: 98_765,
            accel: [5, -2, 1001],
            gyro: [0, 3, -1],
            roll: 2.5,
            pitch: -1.0,
            yaw: 90.0,
            methane_ppm: 32.4,
            co_raw: 280,
            battery_v: 3.71,
            battery_low: false,
            force: 430,
            worn: true,
            state: 2,
            sos: false,
            overridden: false,
            heart_rate_bpm: 91.0,
            spo2_pct: 96.5,
            severity: Severity::Critical,
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = sample_reading();
        let frame = encode_frame(&original).unwrap();
        let (decoded, consumed) = decode_frame(&frame).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn header_is_correct() {
        let frame = encode_frame(&Reading::default()).unwrap();
        assert_eq!(frame[0], MAGIC_BYTE);
        assert_eq!(frame[1], FRAME_VERSION);
        let len = u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]) as usize;
        assert_eq!(len, frame.len() - HEADER_SIZE);
    }

    #[test]
    fn rejects_invalid_magic() {
        let mut frame = encode_frame(&Reading::default()).unwrap();
        frame[0] = 0xFF;
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::InvalidMagic(0xFF))
        ));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut frame = encode_frame(&Reading::default()).unwrap();
        frame[1] = 9;
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::VersionMismatch(9))
        ));
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(matches!(
            decode_frame(&[MAGIC_BYTE, FRAME_VERSION, 0]),
            Err(ProtocolError::TooShort(3))
        ));
    }

    #[test]
    fn incomplete_frame_reports_missing_bytes() {
        let frame = encode_frame(&sample_reading()).unwrap();
        let cut = &frame[..frame.len() - 4];
        assert!(matches!(
            decode_frame(cut),
            Err(ProtocolError::Incomplete { .. })
        ));
    }

    #[test]
    fn two_frames_in_one_buffer_decode_sequentially() {
        let a = sample_reading();
        let b = Reading {
            device_id: 13,
            ..Reading::default()
        };
        let mut buf = encode_frame(&a).unwrap();
        buf.extend(encode_frame(&b).unwrap());

        let (first, consumed) = decode_frame(&buf).unwrap();
        assert_eq!(first, a);
        let (second, _) = decode_frame(&buf[consumed..]).unwrap();
        assert_eq!(second, b);
    }
}
