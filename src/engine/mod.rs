mod admission;
mod error;
mod lifecycle;
mod queries;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::auth::RoleSource;
use crate::journal::Journal;
use crate::model::*;
use crate::notify::ChangeFeed;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group
/// commit:
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. One flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(
    journal: &mut Journal,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    journal: &mut Journal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking admission and lifecycle engine.
///
/// Every resource's state lives behind its own `RwLock`; `create_reservation`
/// holds the resource's write lock across the conflict check, the journal
/// append, and the in-memory insert, so concurrent creates on one resource
/// serialize and can never both pass the overlap check.
pub struct Engine {
    pub(super) state: DashMap<Ulid, SharedResourceState>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub feed: Arc<ChangeFeed>,
    /// Reverse lookup: reservation id → resource id.
    pub(super) reservation_index: DashMap<Ulid, Ulid>,
    pub(super) roles: Arc<dyn RoleSource>,
}

/// Apply an event directly to a ResourceState (no locking — caller holds
/// the lock). Status transitions touch nothing but `status`.
fn apply_to_resource(rs: &mut ResourceState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ReservationRequested {
            id,
            resource_id,
            guest_id,
            stay,
        } => {
            rs.insert_reservation(Reservation {
                id: *id,
                guest_id: *guest_id,
                stay: *stay,
                status: ReservationStatus::Pending,
            });
            index.insert(*id, *resource_id);
        }
        Event::ReservationConfirmed { id, .. } => {
            if let Some(r) = rs.find_mut(*id) {
                r.status = ReservationStatus::Confirmed;
            }
        }
        Event::ReservationCancelled { id, .. } => {
            if let Some(r) = rs.find_mut(*id) {
                r.status = ReservationStatus::Cancelled;
            }
        }
        Event::ReservationCheckedOut { id, .. } => {
            if let Some(r) = rs.find_mut(*id) {
                r.status = ReservationStatus::CheckedOut;
            }
        }
        Event::ResourceAvailabilitySet { available, .. } => {
            rs.available = *available;
        }
        // ResourceListed is handled at the map level, not here
        Event::ResourceListed { .. } => {}
    }
}

impl Engine {
    pub fn new(
        journal_path: PathBuf,
        feed: Arc<ChangeFeed>,
        roles: Arc<dyn RoleSource>,
    ) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            state: DashMap::new(),
            journal_tx,
            feed,
            reservation_index: DashMap::new(),
            roles,
        };

        // Replay — we are the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never blocking_write here: replay may run
        // inside an async context.
        for event in &events {
            match event {
                Event::ResourceListed { id, owner_id, available } => {
                    let rs = ResourceState::new(*id, *owner_id, *available);
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                other => {
                    if let Some(resource_id) = event_resource_id(other)
                        && let Some(entry) = engine.state.get(&resource_id)
                    {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_resource(&mut guard, other, &engine.reservation_index);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write an event to the journal via the background group-commit writer.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn resource_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_index
            .get(reservation_id)
            .map(|e| *e.value())
    }

    /// Journal append + apply + publish in one call. Durability ordering:
    /// an event reaches the feed only after it is fsynced and applied.
    pub(super) async fn persist_and_apply(
        &self,
        resource_id: Ulid,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        apply_to_resource(rs, event, &self.reservation_index);
        self.feed.publish(resource_id, event);
        Ok(())
    }

    /// Lookup reservation → resource, get resource, acquire write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ResourceState>), EngineError> {
        let resource_id = self
            .resource_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.write_owned().await;
        Ok((resource_id, guard))
    }

    /// Rewrite the journal with only the events needed to recreate the
    /// current state: one listing per resource, one admission per
    /// reservation, one status record per non-pending reservation.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let resource_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in resource_ids {
            let Some(rs) = self.get_resource(&id) else { continue };
            let guard = rs.read().await;

            events.push(Event::ResourceListed {
                id: guard.id,
                owner_id: guard.owner_id,
                available: guard.available,
            });

            for r in &guard.reservations {
                events.push(Event::ReservationRequested {
                    id: r.id,
                    resource_id: guard.id,
                    guest_id: r.guest_id,
                    stay: r.stay,
                });
                match r.status {
                    ReservationStatus::Pending => {}
                    ReservationStatus::Confirmed => events.push(Event::ReservationConfirmed {
                        id: r.id,
                        resource_id: guard.id,
                    }),
                    ReservationStatus::Cancelled => events.push(Event::ReservationCancelled {
                        id: r.id,
                        resource_id: guard.id,
                    }),
                    ReservationStatus::CheckedOut => events.push(Event::ReservationCheckedOut {
                        id: r.id,
                        resource_id: guard.id,
                    }),
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the resource id from an event (None for ResourceListed, which is
/// routed at the map level).
fn event_resource_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ReservationRequested { resource_id, .. }
        | Event::ReservationConfirmed { resource_id, .. }
        | Event::ReservationCancelled { resource_id, .. }
        | Event::ReservationCheckedOut { resource_id, .. } => Some(*resource_id),
        Event::ResourceAvailabilitySet { id, .. } => Some(*id),
        Event::ResourceListed { .. } => None,
    }
}
