//! # Sentinela Gateway
//!
//! Ingere a telemetria do capacete pela porta serial, classifica cada
//! leitura contra a tabela de thresholds, persiste excedências e
//! alertas, e republica tudo em tempo real para os observadores
//! conectados (dashboards, visualizador 3D).
//!
//! ## Console
//! - `c`        – pede calibração ao dispositivo
//! - `0`–`5`    – força um estado no firmware
//! - `status`   – imprime a última leitura de cada dispositivo
//! - `q`        – encerra o gateway

mod hub;
mod live;
mod reader;
mod storage;
mod stream_server;

use crossbeam_channel::bounded;
use hub::BroadcastHub;
use live::LiveStore;
use reader::{ReaderDeps, SerialOpener};
use sentinel_core::config::AppConfig;
use sentinel_core::Reading;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::{JsonlStore, MemStore, ReadingStore};
use tracing::{error, info, warn};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⛑  SENTINELA GATEWAY – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Serial:    {} @ {}", config.link.port, config.link.baud);
    println!("  Stream:    {}:{}", config.stream.bind_addr, config.stream.port);
    println!(
        "  Storage:   {}",
        if config.storage.enabled {
            config.storage.data_dir.as_str()
        } else {
            "desligado"
        }
    );
    println!("  Throttle:  {} ms", config.hub.min_broadcast_interval_ms);
    println!("  Protocolo: frame v{}", sentinel_core::FRAME_VERSION);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Componentes compartilhados ──
    let running = Arc::new(AtomicBool::new(true));
    let live = Arc::new(LiveStore::new());
    let broadcast = Arc::new(BroadcastHub::new(config.hub.subscriber_buffer));

    // Filas limitadas entre a leitora e os consumidores: storage ou
    // assinante lentos nunca seguram a ingestão
    let (hub_tx, hub_rx) = bounded::<Reading>(config.hub.queue_capacity);
    let (sink_tx, sink_rx) = bounded::<reader::SinkEvent>(config.hub.queue_capacity);
    let (cmd_tx, cmd_rx) = bounded::<u8>(16);

    // ── Sink de persistência ──
    let store: Box<dyn ReadingStore> = if config.storage.enabled {
        match JsonlStore::open(Path::new(&config.storage.data_dir)) {
            Ok(store) => Box::new(store),
            Err(e) => {
                error!("Falha ao abrir storage: {e}. Seguindo só em memória");
                Box::new(MemStore::default())
            }
        }
    } else {
        info!("Persistência desligada no config; alertas ficam só em memória");
        Box::new(MemStore::default())
    };
    let sink_handle = storage::spawn_sink_thread(store, sink_rx, running.clone());

    // ── Hub de broadcast ──
    let hub_handle = hub::spawn_hub_thread(
        broadcast.clone(),
        hub_rx,
        Duration::from_millis(config.hub.min_broadcast_interval_ms),
        running.clone(),
    );

    // ── Servidor de stream ──
    let server_handle =
        match stream_server::spawn_stream_server(&config.stream, broadcast.clone(), running.clone())
        {
            Ok((handle, addr)) => {
                info!("Observadores podem conectar em {addr}");
                Some(handle)
            }
            Err(e) => {
                error!("Falha ao subir o servidor de stream: {e}. Seguindo sem observadores");
                None
            }
        };

    // ── Thread leitora (dona exclusiva do link serial) ──
    let reader_handle = reader::spawn_reader(
        Box::new(SerialOpener::new(config.link.clone())),
        ReaderDeps {
            thresholds: config.thresholds.clone(),
            live: live.clone(),
            hub_tx,
            sink_tx,
            cmd_rx,
            running: running.clone(),
            reconnect_delay: Duration::from_secs_f64(config.link.reconnect_delay_secs),
        },
    );

    // ── Console ──
    let mut quit_requested = false;
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match parse_command(&line) {
            Command::Quit => {
                quit_requested = true;
                break;
            }
            Command::Device(byte) => {
                if cmd_tx.try_send(byte).is_err() {
                    warn!("Fila de comandos cheia, comando descartado");
                }
            }
            Command::Status => print_status(&live, &broadcast),
            Command::Unknown => {
                if !line.trim().is_empty() {
                    println!("Comandos: c, 0-5, status, q");
                }
            }
        }
    }

    // stdin fechado sem `q` (rodando como serviço): segue até ser morto
    if !quit_requested {
        info!("Console indisponível; rodando até o processo ser encerrado");
        loop {
            std::thread::park();
        }
    }

    // ── Shutdown ordenado ──
    info!("Encerrando gateway...");
    running.store(false, Ordering::Relaxed);
    if reader_handle.join().is_err() {
        warn!("Thread leitora terminou com panic");
    }
    let _ = hub_handle.join();
    let _ = sink_handle.join();
    if let Some(handle) = server_handle {
        let _ = handle.join();
    }
    info!("Gateway encerrado");
}

/// Comando digitado no console.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Byte repassado ao dispositivo pelo link serial
    Device(u8),
    Status,
    Quit,
    Unknown,
}

fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    match trimmed {
        "q" | "quit" | "exit" => Command::Quit,
        "status" => Command::Status,
        "c" => Command::Device(b'c'),
        "0" | "1" | "2" | "3" | "4" | "5" => Command::Device(trimmed.as_bytes()[0]),
        _ => Command::Unknown,
    }
}

fn print_status(live: &LiveStore, hub: &BroadcastHub) {
    let snapshot = live.snapshot();
    if snapshot.is_empty() {
        println!("Nenhum dispositivo reportou ainda.");
        return;
    }
    println!(
        "{} dispositivo(s), {} observador(es):",
        snapshot.len(),
        hub.subscriber_count()
    );
    for r in snapshot {
        println!(
            "  #{:<4} ts={:<10} CH4 {:>5.1} PPM | bat {:.2} V | FC {:>5.1} bpm | SpO2 {:>4.1}% | {} | {}",
            r.device_id,
            r.timestamp_ms,
            r.methane_ppm,
            r.battery_v,
            r.heart_rate_bpm,
            r.spo2_pct,
            if r.worn { "vestido" } else { "fora da cabeça" },
            r.severity.as_str(),
        );
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_commands_parse() {
        assert_eq!(parse_command("q"), Command::Quit);
        assert_eq!(parse_command("  quit "), Command::Quit);
        assert_eq!(parse_command("status"), Command::Status);
        assert_eq!(parse_command("c"), Command::Device(b'c'));
        assert_eq!(parse_command("3"), Command::Device(b'3'));
        assert_eq!(parse_command("7"), Command::Unknown);
        assert_eq!(parse_command("bobagem"), Command::Unknown);
    }
}
