//! In-process transport between one authority and its observers.
//!
//! Every frame goes through bincode so the same encode/decode path a real
//! socket would use is exercised. Observers are added with an owner flag that
//! drives skip-owner filtering on snapshots.

use std::collections::VecDeque;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::character::LocomotionCharacter;
use crate::replication::{LocomotionBroadcast, LocomotionRequest, OutgoingMessage, ReplicatedLocomotion};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum SyncFrame {
    Snapshot(ReplicatedLocomotion),
    Request(LocomotionRequest),
    Broadcast(LocomotionBroadcast),
}

pub fn encode_frame(frame: &SyncFrame) -> Result<Vec<u8>, String> {
    bincode::serialize(frame).map_err(|e| format!("failed to encode sync frame: {e}"))
}

pub fn decode_frame(bytes: &[u8]) -> Result<SyncFrame, String> {
    bincode::deserialize(bytes).map_err(|e| format!("failed to decode sync frame: {e}"))
}

#[derive(Debug, Default)]
struct ObserverQueue {
    is_owner: bool,
    inbox: VecDeque<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct LoopbackLink {
    authority_inbox: VecDeque<Vec<u8>>,
    observers: Vec<ObserverQueue>,
}

impl LoopbackLink {
    /// Register an observer and return its index.
    pub fn add_observer(&mut self, is_owner: bool) -> usize {
        self.observers.push(ObserverQueue {
            is_owner,
            inbox: VecDeque::new(),
        });
        self.observers.len() - 1
    }

    pub fn pending_for_authority(&self) -> usize {
        self.authority_inbox.len()
    }

    /// Apply queued requests, then publish broadcasts and a fresh snapshot.
    pub fn pump_authority(&mut self, authority: &mut LocomotionCharacter) -> Result<(), String> {
        while let Some(bytes) = self.authority_inbox.pop_front() {
            match decode_frame(&bytes)? {
                SyncFrame::Request(request) => authority.handle_request(request),
                other => warn!("Authority ignoring {:?}", other),
            }
        }

        for message in authority.drain_outgoing() {
            match message {
                OutgoingMessage::ToAll(broadcast) => self.publish(&SyncFrame::Broadcast(broadcast))?,
                OutgoingMessage::ToAuthority(request) => warn!("Authority tried to send {:?} to itself", request),
            }
        }

        self.publish(&SyncFrame::Snapshot(authority.capture_snapshot()))
    }

    /// Forward an observer's requests, then apply what the authority sent it.
    pub fn pump_observer(&mut self, index: usize, observer: &mut LocomotionCharacter) -> Result<(), String> {
        for message in observer.drain_outgoing() {
            match message {
                OutgoingMessage::ToAuthority(request) => {
                    self.authority_inbox.push_back(encode_frame(&SyncFrame::Request(request))?);
                }
                OutgoingMessage::ToAll(broadcast) => warn!("Observer cannot broadcast {:?}", broadcast),
            }
        }

        let queue = self
            .observers
            .get_mut(index)
            .ok_or_else(|| format!("no observer at index {index}"))?;
        let is_owner = queue.is_owner;
        let frames: Vec<Vec<u8>> = queue.inbox.drain(..).collect();
        for bytes in frames {
            match decode_frame(&bytes)? {
                SyncFrame::Snapshot(snapshot) => observer.apply_replicated(&snapshot, is_owner),
                SyncFrame::Broadcast(broadcast) => observer.handle_broadcast(broadcast),
                SyncFrame::Request(request) => warn!("Observer ignoring {:?}", request),
            }
        }
        Ok(())
    }

    fn publish(&mut self, frame: &SyncFrame) -> Result<(), String> {
        let bytes = encode_frame(frame)?;
        for observer in &mut self.observers {
            observer.inbox.push_back(bytes.clone());
        }
        Ok(())
    }
}
