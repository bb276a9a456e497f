//! The process-wide machine: mechanism ids and per-world default mechanisms.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
};

use log::{debug, warn};

use crate::ecs::{
    mechanism::Mechanism,
    status::{Error, Outcome},
    subject::MechanismId,
};

/// Identifies a host world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(pub u64);

const MECHANISM_IDS: usize = u8::MAX as usize + 1;

#[derive(Default)]
struct MechanismIds {
    free: Vec<u8>,
    next: usize,
    live: usize,
}

/// Shared state behind every mechanism of the process.
///
/// Mechanism ids are dense: released ids are reused before new ones are handed out, so at most
/// 256 mechanisms can be alive at once.
pub struct Machine {
    ids: Mutex<MechanismIds>,
    worlds: Mutex<HashMap<WorldId, Arc<Mutex<Mechanism>>>>,
}

impl Machine {
    pub(crate) fn new() -> Self {
        Self {
            ids: Mutex::new(MechanismIds::default()),
            worlds: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static Machine {
        static MACHINE: OnceLock<Machine> = OnceLock::new();
        MACHINE.get_or_init(Machine::new)
    }

    /// Take a mechanism id.
    pub fn retain_mechanism_id(&self) -> Outcome<MechanismId> {
        let mut ids = self.ids.lock().unwrap();
        let id = match ids.free.pop() {
            Some(id) => id,
            None if ids.next < MECHANISM_IDS => {
                ids.next += 1;
                (ids.next - 1) as u8
            }
            None => {
                warn!("all {} mechanism ids are taken", MECHANISM_IDS);
                return Err(Error::OutOfLimit);
            }
        };
        ids.live += 1;
        debug!("retained mechanism id {}", id);
        Ok(MechanismId::new(id))
    }

    /// Give a mechanism id back.
    pub fn release_mechanism_id(&self, id: MechanismId) {
        let mut ids = self.ids.lock().unwrap();
        debug_assert!(!ids.free.contains(&(id.index() as u8)), "double release of {:?}", id);
        ids.free.push(id.index() as u8);
        ids.live -= 1;
        debug!("released mechanism id {}", id.index());
    }

    /// Number of mechanisms alive.
    pub fn mechanism_count(&self) -> usize {
        self.ids.lock().unwrap().live
    }

    /// The default mechanism of a world, created on first use.
    pub fn obtain_mechanism(&self, world: WorldId) -> Outcome<Arc<Mutex<Mechanism>>> {
        let mut worlds = self.worlds.lock().unwrap();
        if let Some(mechanism) = worlds.get(&world) {
            return Ok(mechanism.clone());
        }
        let mechanism = Arc::new(Mutex::new(Mechanism::new()?));
        worlds.insert(world, mechanism.clone());
        debug!("created default mechanism for {:?}", world);
        Ok(mechanism)
    }

    /// Forget a world's default mechanism. It is dropped once the last reference goes.
    pub fn release_world(&self, world: WorldId) -> bool {
        let released = self.worlds.lock().unwrap().remove(&world);
        released.is_some()
    }

    /// Forget every world.
    pub fn reset(&self) {
        let worlds = std::mem::take(&mut *self.worlds.lock().unwrap());
        drop(worlds);
    }
}
