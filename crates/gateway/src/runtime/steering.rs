//! Mid-run steering and post-run follow-up queues.
//!
//! Two lanes with independent delivery modes: `steering` messages are
//! polled between tool batches inside a run; `follow_up` messages are
//! drained once the run finishes.

use std::collections::VecDeque;

use parking_lot::Mutex;

use mg_domain::config::{DeliveryMode, SteeringConfig};

/// Thread-safe FIFO with a steering lane and a follow-up lane.
pub struct SteeringQueue {
    config: SteeringConfig,
    steering: Mutex<VecDeque<String>>,
    follow_up: Mutex<VecDeque<String>>,
}

impl SteeringQueue {
    pub fn new(config: SteeringConfig) -> Self {
        Self {
            config,
            steering: Mutex::new(VecDeque::new()),
            follow_up: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a message to redirect the currently-running turn.
    pub fn push_steering(&self, message: impl Into<String>) {
        self.steering.lock().push_back(message.into());
    }

    /// Queue a message for after the run completes.
    pub fn push_follow_up(&self, message: impl Into<String>) {
        self.follow_up.lock().push_back(message.into());
    }

    /// Drain the steering lane according to its delivery mode. Called
    /// after every tool batch.
    pub fn get_steering_messages(&self) -> Vec<String> {
        drain(&self.steering, self.config.steering_mode)
    }

    /// Drain the follow-up lane according to its delivery mode.
    pub fn get_follow_up_messages(&self) -> Vec<String> {
        drain(&self.follow_up, self.config.follow_up_mode)
    }

    pub fn steering_len(&self) -> usize {
        self.steering.lock().len()
    }

    pub fn follow_up_len(&self) -> usize {
        self.follow_up.lock().len()
    }
}

fn drain(lane: &Mutex<VecDeque<String>>, mode: DeliveryMode) -> Vec<String> {
    let mut queue = lane.lock();
    match mode {
        DeliveryMode::OneAtATime => queue.pop_front().into_iter().collect(),
        DeliveryMode::All => queue.drain(..).collect(),
    }
}
