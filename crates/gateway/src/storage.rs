//! Alert Persistence Sink – gravação append-only de leituras e alertas.
//!
//! O leitor enfileira; a thread do sink consome e grava. Só leituras
//! com severidade acima de "normal" chegam aqui (persistir tudo
//! explodiria o armazenamento). Falha de gravação é logada e a
//! leitura/alerta daquela ocorrência se perde – sem retry inline, a
//! ingestão nunca espera o storage.
//!
//! O formato é JSON Lines: um documento por linha, um arquivo para
//! leituras e outro para alertas. A camada de rotas lê esses arquivos
//! como a coleção de documentos; este núcleo só faz append.

use crate::reader::SinkEvent;
use crossbeam_channel::Receiver;
use sentinel_core::severity;
use sentinel_core::{Alert, Reading};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identificador de leitura persistida.
pub type ReadingId = u64;
/// Identificador de alerta persistido.
pub type AlertId = u64;

/// Erros do sink de persistência.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Erro de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro de serialização: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Interface estreita consumida pelo pipeline: gravar uma leitura,
/// gravar um alerta que a referencia. Nada de update/delete.
pub trait ReadingStore: Send {
    fn store_reading(&mut self, reading: &Reading) -> Result<ReadingId, StoreError>;
    fn store_alert(&mut self, alert: &Alert) -> Result<AlertId, StoreError>;
}

// ──────────────────────────────────────────────
// JSONL
// ──────────────────────────────────────────────

#[derive(Serialize)]
struct ReadingRecord<'a> {
    id: ReadingId,
    #[serde(flatten)]
    reading: &'a Reading,
}

#[derive(Serialize)]
struct AlertRecord<'a> {
    id: AlertId,
    #[serde(flatten)]
    alert: &'a Alert,
}

/// Store append-only em arquivos `readings.jsonl` / `alerts.jsonl`.
///
/// Ids são monotônicos por arquivo; ao reabrir, continuam do número
/// de linhas existente.
pub struct JsonlStore {
    readings: File,
    alerts: File,
    next_reading_id: ReadingId,
    next_alert_id: AlertId,
}

impl JsonlStore {
    /// Abre (criando se preciso) os arquivos no diretório de dados.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let readings_path = data_dir.join("readings.jsonl");
        let alerts_path = data_dir.join("alerts.jsonl");

        let next_reading_id = count_lines(&readings_path)? + 1;
        let next_alert_id = count_lines(&alerts_path)? + 1;

        let readings = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&readings_path)?;
        let alerts = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&alerts_path)?;

        info!(
            "Storage aberto em {} (próxima leitura #{next_reading_id}, próximo alerta #{next_alert_id})",
            data_dir.display()
        );

        Ok(Self {
            readings,
            alerts,
            next_reading_id,
            next_alert_id,
        })
    }
}

/// Conta as linhas de um arquivo JSONL existente (0 se não existe).
fn count_lines(path: &Path) -> Result<u64, StoreError> {
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().count() as u64)
}

impl ReadingStore for JsonlStore {
    fn store_reading(&mut self, reading: &Reading) -> Result<ReadingId, StoreError> {
        let id = self.next_reading_id;
        let record = ReadingRecord { id, reading };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        self.readings.write_all(line.as_bytes())?;
        self.readings.flush()?;
        self.next_reading_id += 1;
        Ok(id)
    }

    fn store_alert(&mut self, alert: &Alert) -> Result<AlertId, StoreError> {
        let id = self.next_alert_id;
        let record = AlertRecord { id, alert };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        self.alerts.write_all(line.as_bytes())?;
        self.alerts.flush()?;
        self.next_alert_id += 1;
        Ok(id)
    }
}

// ──────────────────────────────────────────────
// Store em memória (testes e modo demonstração)
// ──────────────────────────────────────────────

/// Store em memória; guarda tudo em `Vec` para inspeção. Usado nos
/// testes e quando a persistência está desligada no config.
#[derive(Debug, Default)]
pub struct MemStore {
    pub readings: Vec<Reading>,
    pub alerts: Vec<Alert>,
    /// Se verdadeiro, toda gravação falha (para testar o caminho de erro)
    pub fail: bool,
}

impl ReadingStore for MemStore {
    fn store_reading(&mut self, reading: &Reading) -> Result<ReadingId, StoreError> {
        if self.fail {
            return Err(StoreError::Io(std::io::Error::other("storage indisponível")));
        }
        self.readings.push(reading.clone());
        Ok(self.readings.len() as ReadingId)
    }

    fn store_alert(&mut self, alert: &Alert) -> Result<AlertId, StoreError> {
        if self.fail {
            return Err(StoreError::Io(std::io::Error::other("storage indisponível")));
        }
        self.alerts.push(alert.clone());
        Ok(self.alerts.len() as AlertId)
    }
}

// ──────────────────────────────────────────────
// Thread consumidora
// ──────────────────────────────────────────────

/// Período máximo de bloqueio entre checagens de shutdown.
const TICK: Duration = Duration::from_millis(100);

/// Inicia a thread do sink consumindo a fila de leituras qualificadas.
pub fn spawn_sink_thread(
    mut store: Box<dyn ReadingStore>,
    rx: Receiver<SinkEvent>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("persist-sink".into())
        .spawn(move || sink_loop(store.as_mut(), &rx, &running))
        .expect("Falha ao criar thread do sink")
}

fn sink_loop(store: &mut dyn ReadingStore, rx: &Receiver<SinkEvent>, running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        match rx.recv_timeout(TICK) {
            Ok(event) => persist_event(store, &event),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    // Drena o que já estava na fila antes do shutdown
    while let Ok(event) = rx.try_recv() {
        persist_event(store, &event);
    }
    info!("Sink de persistência encerrado");
}

/// Grava a leitura e, com o id devolvido, o alerta que a referencia.
fn persist_event(store: &mut dyn ReadingStore, event: &SinkEvent) {
    match store.store_reading(&event.reading) {
        Ok(reading_id) => {
            let alert = severity::compose_alert(&event.reading, &event.triggers, reading_id);
            match store.store_alert(&alert) {
                Ok(alert_id) => {
                    debug!(
                        "Alerta #{alert_id} gravado (leitura #{reading_id}, severidade {})",
                        alert.severity.as_str()
                    );
                }
                Err(e) => warn!("Falha ao gravar alerta: {e}"),
            }
        }
        // Best-effort: loga e segue, a leitura desta ocorrência se perde
        Err(e) => warn!("Falha ao gravar leitura: {e}"),
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
