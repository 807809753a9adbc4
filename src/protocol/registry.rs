use crate::core::packet::Packet;
use crate::core::wire;
use crate::error::{constants, LinkError, Result};
use std::collections::HashMap;
use std::io::Read;
use std::sync::RwLock;
use tracing::warn;

type DecodeFn = Box<dyn Fn(&mut dyn Read) -> Result<Packet> + Send + Sync + 'static>;

/// Decoder table keyed by the one-byte wire discriminant.
///
/// The stream handed to a decoder is already positioned past the
/// discriminant byte. Registration is last-write-wins: colliding variants
/// are a configuration hazard and get flagged, not rejected.
pub struct PacketRegistry {
    decoders: RwLock<HashMap<u8, DecodeFn>>,
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl PacketRegistry {
    /// An empty registry with no decoders at all.
    pub fn new() -> Self {
        Self {
            decoders: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-loaded with the built-in catalog: `Disconnect` and
    /// `Advance`. `Connect` is encode-only and deliberately absent.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        let _ = registry.register(Packet::DISCONNECT, |r| {
            Ok(Packet::Disconnect {
                reason: wire::read_str(r)?,
            })
        });
        let _ = registry.register(Packet::ADVANCE, |r| {
            Ok(Packet::Advance {
                bridge_info: wire::read_str(r)?,
            })
        });
        registry
    }

    /// Associate `discriminant` with `decoder`, overwriting any previous
    /// entry (last-write-wins).
    pub fn register<F>(&self, discriminant: u8, decoder: F) -> Result<()>
    where
        F: Fn(&mut dyn Read) -> Result<Packet> + Send + Sync + 'static,
    {
        let mut decoders = self
            .decoders
            .write()
            .map_err(|_| LinkError::Custom(constants::ERR_REGISTRY_WRITE_LOCK.to_string()))?;

        if decoders.insert(discriminant, Box::new(decoder)).is_some() {
            warn!(
                discriminant,
                "decoder overwritten; two packet variants collide on one discriminant"
            );
        }
        Ok(())
    }

    /// Look up and run the decoder for `discriminant`.
    ///
    /// # Errors
    /// [`LinkError::UnknownPacket`] when no decoder is registered; otherwise
    /// whatever the decoder itself fails with. In both cases the frame must
    /// be treated as consumed-and-dropped by the caller.
    pub fn decode(&self, discriminant: u8, r: &mut dyn Read) -> Result<Packet> {
        let decoders = self
            .decoders
            .read()
            .map_err(|_| LinkError::Custom(constants::ERR_REGISTRY_READ_LOCK.to_string()))?;

        let decoder = decoders
            .get(&discriminant)
            .ok_or(LinkError::UnknownPacket(discriminant))?;
        decoder(r)
    }

    /// Whether a decoder is registered for `discriminant`.
    pub fn knows(&self, discriminant: u8) -> bool {
        self.decoders
            .read()
            .map(|d| d.contains_key(&discriminant))
            .unwrap_or(false)
    }
}
