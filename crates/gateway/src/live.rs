//! Live State Store – última leitura conhecida de cada dispositivo.
//!
//! Mapa compartilhado escrito pela thread leitora e lido por pollers
//! (console, camada de rotas). Última escrita vence por chave; leituras
//! devolvem cópias, nunca referências ao estado interno.

use parking_lot::RwLock;
use sentinel_core::Reading;
use std::collections::HashMap;

/// Tabela latest-value-per-device, injetável (sem globals de módulo).
#[derive(Debug, Default)]
pub struct LiveStore {
    map: RwLock<HashMap<u16, Reading>>,
}

impl LiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sobrescreve a entrada do dispositivo da leitura.
    pub fn update(&self, reading: Reading) {
        self.map.write().insert(reading.device_id, reading);
    }

    /// Última leitura de um dispositivo, se já houve alguma.
    pub fn latest(&self, device_id: u16) -> Option<Reading> {
        self.map.read().get(&device_id).cloned()
    }

    /// Cópia da última leitura de todos os dispositivos conhecidos,
    /// ordenada por id para saída estável.
    pub fn snapshot(&self) -> Vec<Reading> {
        let mut all: Vec<Reading> = self.map.read().values().cloned().collect();
        all.sort_by_key(|r| r.device_id);
        all
    }

    /// Quantos dispositivos já reportaram.
    pub fn device_count(&self) -> usize {
        self.map.read().len()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
