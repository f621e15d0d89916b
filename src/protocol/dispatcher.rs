use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::HandshakeContext;
use crate::protocol::session::Phase;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type HandlerFn = dyn Fn(&HandshakeContext<'_>, &mut Packet) -> Result<Phase> + Send + Sync + 'static;

/// Opcode router for the negotiation phase.
///
/// Each handler receives the bytes following its opcode and returns the phase the session moves
/// to. Handlers are registered once at startup and looked up per frame.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<u8, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut opcodes: Vec<u8> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().copied().collect())
            .unwrap_or_default();
        opcodes.sort_unstable();
        f.debug_struct("Dispatcher").field("opcodes", &opcodes).finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register<F>(&self, opcode: u8, handler: F) -> Result<()>
    where
        F: Fn(&HandshakeContext<'_>, &mut Packet) -> Result<Phase> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        handlers.insert(opcode, Box::new(handler));
        Ok(())
    }

    pub fn contains(&self, opcode: u8) -> bool {
        self.handlers
            .read()
            .map(|handlers| handlers.contains_key(&opcode))
            .unwrap_or(false)
    }

    pub fn dispatch(&self, opcode: u8, hs: &HandshakeContext<'_>, packet: &mut Packet) -> Result<Phase> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?;

        handlers
            .get(&opcode)
            .ok_or(ProtocolError::UnknownOpcode(opcode))
            .and_then(|handler| handler(hs, packet))
    }
}
