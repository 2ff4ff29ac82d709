//! The client / template generator (spec section 4.6): given the two fixed
//! anchor relays and a target pair, produces the three unacquired circuits
//! that make up one measurement.

use std::sync::Arc;

use ting_control::Controller;
use ting_types::{Endpoint, Fingerprint, RelayPair, TingLeg};

use crate::circuit::{Circuit, CircuitConfig};

/// Holds the anchors and destination shared by every circuit a run builds.
pub struct Client {
    controller: Arc<dyn Controller>,
    w: Fingerprint,
    z: Fingerprint,
    dest: Endpoint,
    config: CircuitConfig,
}

impl Client {
    pub fn new(
        controller: Arc<dyn Controller>,
        w: Fingerprint,
        z: Fingerprint,
        dest: Endpoint,
        config: CircuitConfig,
    ) -> Self {
        Self {
            controller,
            w,
            z,
            dest,
            config,
        }
    }

    /// Build the X = [W,R1,Z], Y = [W,R2,Z], and XY = [W,R1,R2,Z] circuit
    /// templates for `pair`. None of the three are built yet.
    pub fn template_gen(&self, pair: &RelayPair) -> [Circuit; 3] {
        let (r1, r2) = pair.clone();
        let x = Circuit::new(
            self.controller.clone(),
            vec![self.w.clone(), r1.clone(), self.z.clone()],
            TingLeg::X,
            self.dest.clone(),
            self.config.clone(),
        );
        let y = Circuit::new(
            self.controller.clone(),
            vec![self.w.clone(), r2.clone(), self.z.clone()],
            TingLeg::Y,
            self.dest.clone(),
            self.config.clone(),
        );
        let xy = Circuit::new(
            self.controller.clone(),
            vec![self.w.clone(), r1, r2, self.z.clone()],
            TingLeg::Xy,
            self.dest.clone(),
            self.config.clone(),
        );
        [x, y, xy]
    }
}
