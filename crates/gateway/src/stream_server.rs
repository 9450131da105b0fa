//! Servidor de stream TCP para observadores (dashboards, visualizador
//! 3D).
//!
//! Cada conexão aceita vira um assinante do hub e recebe as leituras
//! republicadas como frames do protocolo Sentinela. O que o cliente
//! mandar de volta é tratado como keepalive e descartado. Se o hub
//! remover o assinante (buffer cheio) ou a escrita falhar, a conexão
//! é fechada.

use crate::hub::BroadcastHub;
use sentinel_core::config::StreamConfig;
use sentinel_core::protocol;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Período máximo de bloqueio dos loops; limita a latência do shutdown.
const TICK: Duration = Duration::from_millis(100);

/// Inicia o servidor de stream. Devolve o handle da thread de accept
/// e o endereço efetivo (útil com porta 0 nos testes).
pub fn spawn_stream_server(
    cfg: &StreamConfig,
    hub: Arc<BroadcastHub>,
    running: Arc<AtomicBool>,
) -> std::io::Result<(JoinHandle<()>, SocketAddr)> {
    let listener = TcpListener::bind((cfg.bind_addr.as_str(), cfg.port))?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;

    let handle = std::thread::Builder::new()
        .name("stream-server".into())
        .spawn(move || accept_loop(&listener, &hub, &running))
        .expect("Falha ao criar thread do servidor de stream");

    Ok((handle, addr))
}

fn accept_loop(listener: &TcpListener, hub: &Arc<BroadcastHub>, running: &Arc<AtomicBool>) {
    info!(
        "Servidor de stream escutando em {}",
        listener.local_addr().map(|a| a.to_string()).unwrap_or_default()
    );

    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!("Observador conectado: {addr}");
                let hub = hub.clone();
                let running = running.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("stream-client-{addr}"))
                    .spawn(move || client_loop(stream, addr, &hub, &running));
                if let Err(e) = spawned {
                    warn!("Falha ao criar thread do observador {addr}: {e}");
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(TICK);
            }
            Err(e) => {
                warn!("Erro no accept: {e}");
                std::thread::sleep(TICK);
            }
        }
    }

    info!("Servidor de stream encerrado");
}

/// Bombeia leituras do hub para um observador até a conexão morrer,
/// o hub nos remover ou o gateway desligar.
fn client_loop(
    mut stream: TcpStream,
    addr: SocketAddr,
    hub: &Arc<BroadcastHub>,
    running: &Arc<AtomicBool>,
) {
    let sub = hub.subscribe();
    if stream.set_nonblocking(true).is_err() {
        hub.unsubscribe(sub.id);
        return;
    }

    let mut keepalive = [0u8; 64];
    loop {
        if !running.load(Ordering::Relaxed) {
            break;
        }

        match sub.rx.recv_timeout(TICK) {
            Ok(reading) => match protocol::encode_frame(&reading) {
                Ok(frame) => {
                    // Socket não-bloqueante: WouldBlock aqui é o buffer
                    // do kernel cheio – consumidor lento, derruba
                    if let Err(e) = stream.write_all(&frame) {
                        debug!("Escrita para {addr} falhou: {e}");
                        break;
                    }
                }
                Err(e) => warn!("Falha ao codificar frame: {e}"),
            },
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                // Sem leitura nova: drena keepalives do cliente
                match stream.read(&mut keepalive) {
                    Ok(0) => {
                        debug!("Observador {addr} fechou a conexão");
                        break;
                    }
                    Ok(_) => {} // keepalive, ignora o conteúdo
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        debug!("Leitura do observador {addr} falhou: {e}");
                        break;
                    }
                }
            }
            // Hub nos removeu (consumidor lento) ou desligou
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    hub.unsubscribe(sub.id);
    info!("Observador desconectado: {addr}");
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
