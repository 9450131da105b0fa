//! Broadcast Hub – fan-out de leituras para assinantes com throttle.
//!
//! A thread do hub consome o canal alimentado pela leitora, coalesce
//! rajadas (última leitura vence) e só publica quando o intervalo
//! mínimo entre broadcasts passou. Assinante lento ou morto – buffer
//! de saída cheio ou canal fechado – é removido na hora, sem afetar
//! os demais nem a thread leitora.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use sentinel_core::Reading;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Período máximo de bloqueio da thread do hub; limita a latência do
/// shutdown.
const TICK: Duration = Duration::from_millis(100);

/// Handle devolvido por [`BroadcastHub::subscribe`].
pub struct Subscription {
    pub id: u64,
    pub rx: Receiver<Reading>,
}

struct Sub {
    id: u64,
    tx: Sender<Reading>,
}

/// Registro de assinantes + fan-out.
pub struct BroadcastHub {
    subs: Mutex<Vec<Sub>>,
    next_id: AtomicU64,
    /// Buffer de saída de cada assinante
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subs: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    /// Registra um novo assinante e devolve seu canal de leituras.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded::<Reading>(self.buffer);
        self.subs.lock().push(Sub { id, tx });
        info!("Assinante {id} registrado");
        Subscription { id, rx }
    }

    /// Remove um assinante; seguro chamar com id já removido.
    pub fn unsubscribe(&self, id: u64) {
        let mut subs = self.subs.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        if subs.len() < before {
            info!("Assinante {id} removido");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.lock().len()
    }

    /// Entrega uma leitura a todos os assinantes.
    ///
    /// `try_send` nunca bloqueia: assinante com buffer cheio ou canal
    /// fechado é descartado do registro. Os ids mortos são coletados
    /// durante a iteração e removidos depois, para que a remoção não
    /// invalide a iteração.
    pub fn publish(&self, reading: &Reading) {
        let mut dead = Vec::new();
        {
            let subs = self.subs.lock();
            for sub in subs.iter() {
                if sub.tx.try_send(reading.clone()).is_err() {
                    dead.push(sub.id);
                }
            }
        }
        for id in dead {
            warn!("Assinante {id} não drena o buffer, removendo");
            self.unsubscribe(id);
        }
    }
}

/// Inicia a thread do hub consumindo o canal da leitora.
pub fn spawn_hub_thread(
    hub: Arc<BroadcastHub>,
    rx: Receiver<Reading>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("broadcast-hub".into())
        .spawn(move || hub_loop(&hub, &rx, interval, &running))
        .expect("Falha ao criar thread do hub")
}

fn hub_loop(
    hub: &BroadcastHub,
    rx: &Receiver<Reading>,
    interval: Duration,
    running: &AtomicBool,
) {
    info!(
        "Hub ativo – intervalo mínimo entre broadcasts: {} ms",
        interval.as_millis()
    );

    // Leitura retida aguardando o intervalo; rajadas sobrescrevem e
    // só a mais recente sai quando o relógio permite.
    let mut pending: Option<Reading> = None;
    let mut last_sent = Instant::now();

    while running.load(Ordering::Relaxed) {
        if let Some(reading) = pending.take() {
            if last_sent.elapsed() >= interval {
                hub.publish(&reading);
                last_sent = Instant::now();
            } else {
                pending = Some(reading);
            }
        }

        let wait = match pending {
            Some(_) => interval.saturating_sub(last_sent.elapsed()).min(TICK),
            None => TICK,
        };
        match rx.recv_timeout(wait) {
            Ok(reading) => {
                if pending.is_some() {
                    debug!("Coalescendo leitura dentro do intervalo de throttle");
                }
                pending = Some(reading);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("Hub encerrado");
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn reading(timestamp_ms: u64) -> Reading {
        Reading {
            device_id: 1,
            timestamp_ms,
            ..Reading::default()
        }
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let hub = BroadcastHub::new(8);
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        hub.unsubscribe(sub.id);
        assert_eq!(hub.subscriber_count(), 0);
        // Idempotente
        hub.unsubscribe(sub.id);
    }

    #[test]
    fn publish_reaches_all_subscribers() {
        let hub = BroadcastHub::new(8);
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.publish(&reading(1));
        assert_eq!(a.rx.try_recv().unwrap().timestamp_ms, 1);
        assert_eq!(b.rx.try_recv().unwrap().timestamp_ms, 1);
    }

    #[test]
    fn slow_subscriber_is_evicted_others_keep_receiving() {
        let hub = BroadcastHub::new(2);
        let slow = hub.subscribe();
        let healthy = hub.subscribe();

        // O saudável drena a cada broadcast; o lento nunca. Com buffer
        // de 2, o terceiro publish encontra o lento cheio e o remove.
        let mut got = Vec::new();
        for i in 1..=3 {
            hub.publish(&reading(i));
            got.push(healthy.rx.try_recv().unwrap().timestamp_ms);
        }
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(got, vec![1, 2, 3]);

        // O lento ficou com as duas primeiras que couberam no buffer
        assert_eq!(slow.rx.try_iter().count(), 2);

        // E o saudável segue recebendo depois da remoção do lento
        hub.publish(&reading(4));
        assert_eq!(healthy.rx.try_recv().unwrap().timestamp_ms, 4);
    }

    #[test]
    fn dropped_receiver_is_evicted_on_next_publish() {
        let hub = BroadcastHub::new(8);
        let sub = hub.subscribe();
        drop(sub.rx);

        hub.publish(&reading(1));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn burst_is_coalesced_to_latest() {
        let hub = Arc::new(BroadcastHub::new(8));
        let sub = hub.subscribe();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = bounded::<Reading>(64);

        let handle = spawn_hub_thread(
            hub.clone(),
            rx,
            Duration::from_millis(150),
            running.clone(),
        );

        // Rajada de 10 leituras bem dentro do intervalo de throttle
        for i in 1..=10 {
            tx.send(reading(i)).unwrap();
        }

        // Um único broadcast, carregando a última da rajada
        let first = sub.rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.timestamp_ms, 10);
        assert!(sub
            .rx
            .recv_timeout(Duration::from_millis(80))
            .is_err());

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn healthy_subscriber_receives_every_throttled_broadcast() {
        let hub = Arc::new(BroadcastHub::new(8));
        let sub = hub.subscribe();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = bounded::<Reading>(64);

        let handle = spawn_hub_thread(
            hub.clone(),
            rx,
            Duration::from_millis(30),
            running.clone(),
        );

        // Leituras espaçadas além do intervalo: cada uma é publicada
        for i in 1..=3 {
            tx.send(reading(i)).unwrap();
            std::thread::sleep(Duration::from_millis(60));
        }

        let mut got = Vec::new();
        while let Ok(r) = sub.rx.recv_timeout(Duration::from_millis(200)) {
            got.push(r.timestamp_ms);
            if got.len() == 3 {
                break;
            }
        }
        assert_eq!(got, vec![1, 2, 3]);

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
