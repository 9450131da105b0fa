//! Thread leitora da porta serial.
//!
//! Dona exclusiva do link: nenhum outro componente lê ou escreve a
//! porta. Máquina de estados Desconectado → Conectando → Lendo; em
//! qualquer erro de E/S volta a Desconectado e tenta reabrir com
//! espera fixa, para sempre – o dispositivo é assumido como alguém
//! que reaparece.
//!
//! Para cada linha completa: decodifica → normaliza/classifica →
//! atualiza o Live State Store incondicionalmente → toda leitura vai
//! ao canal do hub (dashboards suaves) → severidade acima de "normal"
//! vai também ao canal de persistência. `try_send` em ambos: fila
//! cheia descarta o pacote, nunca bloqueia a leitura.
//!
//! Comandos de um byte para o dispositivo (`c`, `0`–`5`) chegam por
//! canal e são escritos no mesmo link entre leituras.

use crate::live::LiveStore;
use crossbeam_channel::{Receiver, Sender};
use sentinel_core::config::{LinkConfig, Thresholds};
use sentinel_core::severity::{self, Trigger};
use sentinel_core::units::Normalizer;
use sentinel_core::{packet, Reading, Severity};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Leitura qualificada a caminho da persistência, com as condições
/// que dispararam (a mensagem do alerta é composta no sink, depois
/// que a leitura ganha id).
#[derive(Debug, Clone)]
pub struct SinkEvent {
    pub reading: Reading,
    pub triggers: Vec<Trigger>,
}

// ──────────────────────────────────────────────
// Abstração do link
// ──────────────────────────────────────────────

/// Um link serial aberto. Leitura com timeout curto; `TimedOut` /
/// `WouldBlock` não são erro, só a deixa de checar comandos/shutdown.
pub trait Link: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

/// Abre links; a leitora chama de novo a cada reconexão.
pub trait LinkOpener: Send {
    fn open(&mut self) -> io::Result<Box<dyn Link>>;
}

struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl Link for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)
    }
}

/// Abre a porta serial configurada (8N1, timeout de leitura curto).
pub struct SerialOpener {
    cfg: LinkConfig,
}

impl SerialOpener {
    pub fn new(cfg: LinkConfig) -> Self {
        Self { cfg }
    }
}

impl LinkOpener for SerialOpener {
    fn open(&mut self) -> io::Result<Box<dyn Link>> {
        let port = serialport::new(&self.cfg.port, self.cfg.baud)
            .timeout(Duration::from_millis(self.cfg.read_timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(io::Error::from)?;
        Ok(Box::new(SerialLink { port }))
    }
}

// ──────────────────────────────────────────────
// Thread leitora
// ──────────────────────────────────────────────

/// Contadores de decodificação de uma sessão de link.
#[derive(Debug, Default)]
struct DecodeStats {
    ok: u64,
    ignored: u64,
    malformed: u64,
}

/// Canais e dependências da thread leitora.
pub struct ReaderDeps {
    pub thresholds: Thresholds,
    pub live: Arc<LiveStore>,
    pub hub_tx: Sender<Reading>,
    pub sink_tx: Sender<SinkEvent>,
    pub cmd_rx: Receiver<u8>,
    pub running: Arc<AtomicBool>,
    pub reconnect_delay: Duration,
}

/// Inicia a thread leitora. Uma por link físico.
pub fn spawn_reader(mut opener: Box<dyn LinkOpener>, deps: ReaderDeps) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("serial-reader".into())
        .spawn(move || reader_loop(opener.as_mut(), &deps))
        .expect("Falha ao criar thread leitora")
}

fn reader_loop(opener: &mut dyn LinkOpener, deps: &ReaderDeps) {
    let mut normalizer = Normalizer::new();

    while deps.running.load(Ordering::Relaxed) {
        match opener.open() {
            Ok(mut link) => {
                info!("Link serial aberto");
                let stats = read_session(link.as_mut(), &mut normalizer, deps);
                info!(
                    "Sessão encerrada – {} pacotes, {} linhas ignoradas, {} malformados",
                    stats.ok, stats.ignored, stats.malformed
                );
            }
            Err(e) => {
                warn!(
                    "Falha ao abrir link: {e}. Nova tentativa em {:.1}s",
                    deps.reconnect_delay.as_secs_f64()
                );
                sleep_checking(deps.reconnect_delay, &deps.running);
            }
        }
    }

    info!("Thread leitora encerrada");
}

/// Lê o link até erro de E/S ou shutdown. Devolve os contadores da
/// sessão.
fn read_session(
    link: &mut dyn Link,
    normalizer: &mut Normalizer,
    deps: &ReaderDeps,
) -> DecodeStats {
    let mut stats = DecodeStats::default();
    // Bytes recebidos ainda sem quebra de linha
    let mut carry: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        if !deps.running.load(Ordering::Relaxed) {
            return stats;
        }

        // Comandos pendentes vão para o dispositivo entre leituras
        while let Ok(cmd) = deps.cmd_rx.try_recv() {
            if let Err(e) = link.write_all(&[cmd]) {
                warn!("Erro ao enviar comando 0x{cmd:02X}: {e}");
                return stats;
            }
            debug!("Comando '{}' enviado ao dispositivo", cmd as char);
        }

        match link.read(&mut buf) {
            // Fim do stream: o outro lado sumiu, reconecta
            Ok(0) => {
                warn!("Link fechado pelo dispositivo");
                return stats;
            }
            Ok(n) => {
                carry.extend_from_slice(&buf[..n]);
                drain_lines(&mut carry, normalizer, deps, &mut stats);
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                // Timeout normal: volta para checar shutdown/comandos
            }
            Err(e) => {
                warn!("Erro de leitura no link: {e}");
                return stats;
            }
        }
    }
}

/// Separa as linhas completas do buffer de acúmulo e processa cada uma.
fn drain_lines(
    carry: &mut Vec<u8>,
    normalizer: &mut Normalizer,
    deps: &ReaderDeps,
    stats: &mut DecodeStats,
) {
    while let Some(pos) = carry.iter().position(|&b| b == b'\n') {
        let line_bytes: Vec<u8> = carry.drain(..=pos).collect();
        // UTF-8 best-effort: bytes inválidos viram U+FFFD e a linha
        // segue para o decodificador, que a rejeita se necessário
        let line = String::from_utf8_lossy(&line_bytes[..pos]);
        process_line(line.trim_end_matches('\r'), normalizer, deps, stats);
    }
}

fn process_line(
    line: &str,
    normalizer: &mut Normalizer,
    deps: &ReaderDeps,
    stats: &mut DecodeStats,
) {
    match packet::parse_line(line) {
        Ok(Some(pkt)) => {
            let mut reading = normalizer.normalize(&pkt, &deps.thresholds);
            let (sev, triggers) = severity::classify(&reading, &deps.thresholds);
            reading.severity = sev;

            // Estado vivo sempre reflete a leitura mais recente,
            // inclusive as "normal"
            deps.live.update(reading.clone());

            if reading.severity > Severity::Normal {
                let event = SinkEvent {
                    reading: reading.clone(),
                    triggers,
                };
                if deps.sink_tx.try_send(event).is_err() {
                    debug!("Fila de persistência cheia, leitura descartada");
                }
            }

            // Política: toda leitura vai ao hub, inclusive "normal";
            // só as excedentes persistem
            if deps.hub_tx.try_send(reading).is_err() {
                debug!("Fila do hub cheia, leitura descartada");
            }

            stats.ok += 1;
        }
        Ok(None) => {
            stats.ignored += 1;
        }
        Err(e) => {
            stats.malformed += 1;
            debug!("Pacote malformado: {e}");
        }
    }
}

/// Dorme em fatias curtas para o shutdown não esperar a espera inteira.
fn sleep_checking(total: Duration, running: &AtomicBool) {
    let slice = Duration::from_millis(50);
    let mut remaining = total;
    while remaining > Duration::ZERO && running.load(Ordering::Relaxed) {
        let nap = remaining.min(slice);
        std::thread::sleep(nap);
        remaining = remaining.saturating_sub(nap);
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
