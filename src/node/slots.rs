//! Slot descriptors and the runtime-side slot state.
//!
//! Each node declares its slots via static `SlotDescriptor` arrays. Input
//! slots hold at most one pending value; output slots hold the set of pipes
//! subscribed to them.

use crate::error::ValidationError;
use crate::link::{Connection, Endpoint, LinkError};
use crate::protocol::{Data, DataType, Message};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Static descriptor for a node's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDescriptor {
    pub name: &'static str,
    pub dtype: DataType,
}

impl SlotDescriptor {
    pub const fn new(name: &'static str, dtype: DataType) -> Self {
        Self { name, dtype }
    }

    pub fn find<'a>(slots: &'a [SlotDescriptor], name: &str) -> Option<&'a SlotDescriptor> {
        slots.iter().find(|s| s.name == name)
    }
}

#[derive(Debug)]
struct InputSlot {
    dtype: DataType,
    value: Option<Data>,
    fresh: bool,
}

/// Pending input values, last write wins.
#[derive(Debug, Default)]
pub struct InputSlots {
    slots: BTreeMap<String, InputSlot>,
}

impl InputSlots {
    pub fn new(descriptors: &[SlotDescriptor]) -> Self {
        let slots = descriptors
            .iter()
            .map(|d| {
                (
                    d.name.to_string(),
                    InputSlot {
                        dtype: d.dtype,
                        value: None,
                        fresh: false,
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// Current value of a slot, `None` when empty or undeclared.
    pub fn get(&self, name: &str) -> Option<&Data> {
        self.slots.get(name)?.value.as_ref()
    }

    /// Whether the slot received a value since the last processing step.
    pub fn is_fresh(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| s.fresh)
    }

    pub fn any_fresh(&self) -> bool {
        self.slots.values().any(|s| s.fresh)
    }

    pub fn dtype(&self, name: &str) -> Option<DataType> {
        self.slots.get(name).map(|s| s.dtype)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn set(&mut self, name: &str, data: Data) -> Result<(), ValidationError> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownSlot(name.to_string()))?;
        if data.dtype() != slot.dtype {
            return Err(ValidationError::SlotType {
                slot: name.to_string(),
                expected: slot.dtype,
                found: data.dtype(),
            });
        }
        slot.value = Some(data);
        slot.fresh = true;
        Ok(())
    }

    pub fn clear(&mut self, name: &str) -> Result<(), ValidationError> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownSlot(name.to_string()))?;
        slot.value = None;
        slot.fresh = false;
        Ok(())
    }

    pub(crate) fn mark_consumed(&mut self) {
        for slot in self.slots.values_mut() {
            slot.fresh = false;
        }
    }
}

/// One pipe from an output slot to an input slot on another node.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub connection: Connection,
    pub slot_in: String,
}

impl Subscriber {
    fn matches(&self, endpoint: Endpoint, slot_in: &str) -> bool {
        self.connection.endpoint() == endpoint && self.slot_in == slot_in
    }
}

#[derive(Debug)]
struct OutputSlot {
    dtype: DataType,
    subscribers: Vec<Subscriber>,
}

/// Subscribers of every output slot.
#[derive(Debug, Default)]
pub struct OutputSlots {
    slots: BTreeMap<String, OutputSlot>,
}

impl OutputSlots {
    pub fn new(descriptors: &[SlotDescriptor]) -> Self {
        let slots = descriptors
            .iter()
            .map(|d| {
                (
                    d.name.to_string(),
                    OutputSlot {
                        dtype: d.dtype,
                        subscribers: Vec::new(),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    pub fn dtype(&self, name: &str) -> Option<DataType> {
        self.slots.get(name).map(|s| s.dtype)
    }

    pub fn subscribers(&self, name: &str) -> &[Subscriber] {
        self.slots
            .get(name)
            .map(|s| s.subscribers.as_slice())
            .unwrap_or(&[])
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots.values().map(|s| s.subscribers.len()).sum()
    }

    /// Subscribe `slot_in` behind `connection` to `slot_out`. Adding an
    /// identical pipe twice keeps one subscription.
    pub fn subscribe(
        &mut self,
        slot_out: &str,
        connection: Connection,
        slot_in: &str,
    ) -> Result<(), ValidationError> {
        let slot = self
            .slots
            .get_mut(slot_out)
            .ok_or_else(|| ValidationError::UnknownSlot(slot_out.to_string()))?;
        if slot
            .subscribers
            .iter()
            .any(|s| s.matches(connection.endpoint(), slot_in))
        {
            debug!("Pipe {} -> {} already installed", slot_out, slot_in);
            return Ok(());
        }
        slot.subscribers.push(Subscriber {
            connection,
            slot_in: slot_in.to_string(),
        });
        Ok(())
    }

    /// Remove the pipe to `slot_in` on `endpoint`. Returns whether one existed.
    pub fn unsubscribe(&mut self, slot_out: &str, endpoint: Endpoint, slot_in: &str) -> bool {
        let Some(slot) = self.slots.get_mut(slot_out) else {
            return false;
        };
        let before = slot.subscribers.len();
        slot.subscribers.retain(|s| !s.matches(endpoint, slot_in));
        slot.subscribers.len() != before
    }

    /// Send `data` to every subscriber of `slot_out` as a DATA message.
    /// Subscribers whose link is closed are dropped. Returns the number of
    /// successful deliveries.
    pub fn publish(&mut self, slot_out: &str, data: &Data) -> usize {
        let Some(slot) = self.slots.get_mut(slot_out) else {
            return 0;
        };
        let mut delivered = 0;
        slot.subscribers.retain(|sub| {
            match sub
                .connection
                .send(Message::data(sub.slot_in.clone(), data.clone()))
            {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(LinkError::Closed) => {
                    warn!(
                        "Subscriber {}:{} closed, dropping pipe from {}",
                        sub.connection.endpoint(),
                        sub.slot_in,
                        slot_out
                    );
                    false
                }
                Err(e) => {
                    warn!("Failed to deliver {} to {}: {}", slot_out, sub.slot_in, e);
                    true
                }
            }
        });
        delivered
    }

    /// Drop every subscription without closing the links.
    pub fn clear(&mut self) {
        for slot in self.slots.values_mut() {
            slot.subscribers.clear();
        }
    }
}
