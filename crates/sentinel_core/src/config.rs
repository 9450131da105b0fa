//! Configuração unificada via TOML.
//!
//! Um único `config.toml` cobre o link serial, a tabela de thresholds,
//! o hub de broadcast, a persistência e o servidor de stream. A tabela
//! de thresholds é lida uma vez na partida e nunca recarregada.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuração do link serial com o capacete.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Caminho da porta serial (ex: "/dev/ttyUSB0", "COM5")
    pub port: String,
    /// Baud rate
    pub baud: u32,
    /// Timeout de leitura (ms) – limita a latência do shutdown
    pub read_timeout_ms: u64,
    /// Espera fixa entre tentativas de reconexão (segundos)
    pub reconnect_delay_secs: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud: 115_200,
            read_timeout_ms: 200,
            reconnect_delay_secs: 2.0,
        }
    }
}

/// Tabela de thresholds de classificação.
///
/// Imutável em tempo de execução: mudar um limite é um novo deploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Metano acima disso (PPM) é crítico
    pub methane_crit_ppm: f32,
    /// Bateria neste valor ou abaixo (V) é baixa
    pub battery_low_v: f32,
    /// SpO2 abaixo disso (%) é alto
    pub spo2_low_pct: f32,
    /// Piso da banda de FC (bpm), inclusivo
    pub heart_low_bpm: f32,
    /// Teto da banda de FC (bpm), inclusivo
    pub heart_high_bpm: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            methane_crit_ppm: 30.0,
            battery_low_v: 3.32,
            spo2_low_pct: 90.0,
            heart_low_bpm: 50.0,
            heart_high_bpm: 120.0,
        }
    }
}

/// Configuração do hub de broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Intervalo mínimo entre broadcasts (ms); leituras mais rápidas
    /// são coalescidas e só a mais recente é enviada
    pub min_broadcast_interval_ms: u64,
    /// Buffer de saída de cada assinante (mensagens)
    pub subscriber_buffer: usize,
    /// Capacidade das filas entre o leitor e os consumidores
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            min_broadcast_interval_ms: 500,
            subscriber_buffer: 32,
            queue_capacity: 256,
        }
    }
}

/// Configuração da persistência (leituras excedentes + alertas).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Desliga a persistência por completo (modo demonstração)
    pub enabled: bool,
    /// Diretório dos arquivos `readings.jsonl` / `alerts.jsonl`
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: "data".into(),
        }
    }
}

/// Configuração do servidor de stream para observadores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Endereço de bind
    pub bind_addr: String,
    /// Porta TCP
    pub port: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 5010,
        }
    }
}

/// Configuração raiz do gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub thresholds: Thresholds,
    pub hub: HubConfig,
    pub storage: StorageConfig,
    pub stream: StreamConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.link.port.is_empty() {
            errors.push("Porta serial não pode ser vazia".into());
        }
        if self.link.baud == 0 {
            errors.push("Baud rate não pode ser 0".into());
        }
        if self.link.read_timeout_ms == 0 || self.link.read_timeout_ms > 5_000 {
            errors.push(format!(
                "Timeout de leitura inválido: {} ms (1–5000)",
                self.link.read_timeout_ms
            ));
        }
        if self.thresholds.heart_low_bpm >= self.thresholds.heart_high_bpm {
            errors.push(format!(
                "Banda de FC inválida: [{}, {}]",
                self.thresholds.heart_low_bpm, self.thresholds.heart_high_bpm
            ));
        }
        if self.hub.subscriber_buffer == 0 || self.hub.queue_capacity == 0 {
            errors.push("Buffers do hub não podem ser 0".into());
        }
        if self.stream.port == 0 {
            errors.push("Porta do stream não pode ser 0".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.link.port, parsed.link.port);
        assert_eq!(config.thresholds.battery_low_v, parsed.thresholds.battery_low_v);
        assert_eq!(config.stream.port, parsed.stream.port);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[link]
port = "COM7"

[thresholds]
methane_crit_ppm = 25.0
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.link.port, "COM7");
        assert_eq!(config.thresholds.methane_crit_ppm, 25.0);
        // Outros campos devem ter valor padrão
        assert_eq!(config.link.baud, 115_200);
        assert_eq!(config.thresholds.battery_low_v, 3.32);
        assert_eq!(config.hub.min_broadcast_interval_ms, 500);
    }

    #[test]
    fn invalid_heart_band_is_rejected() {
        let config = AppConfig {
            thresholds: Thresholds {
                heart_low_bpm: 130.0,
                heart_high_bpm: 120.0,
                ..Thresholds::default()
            },
            ..AppConfig::default()
        };
        assert!(!config.validate().is_empty());
    }
}
