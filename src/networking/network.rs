/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::{crypto_primitives::VerifyingKey, validator_set::ValidatorSet};

use super::messages::Message;

pub trait Network: Clone + Send {
    /// Inform the network provider of the validator set on wake-up, so that it can connect to the
    /// validators that sync requests will be sent to.
    fn init_validator_set(&mut self, validator_set: ValidatorSet);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}
