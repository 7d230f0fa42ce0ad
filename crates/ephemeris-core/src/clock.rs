//! Per-agent simulated clocks.
//!
//! Every agent advances on its own adaptive step, so there is no single
//! world tick. [`AgentClocks`] holds one [`Time`] per agent and is owned
//! exclusively by the driver; the resolver never sees it.
//!
//! A clock only moves forward. Advancing to a non-finite time or to a time
//! not strictly after the current one is rejected, because the committed
//! interval `[clock, next)` would otherwise be empty or inverted.

use std::collections::BTreeMap;

use ephemeris_types::{AgentId, Time};

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClockError {
    /// The agent has no clock.
    #[error("no clock for agent {agent}")]
    UnknownAgent {
        /// The agent that was looked up.
        agent: AgentId,
    },

    /// The proposed time is NaN or infinite.
    #[error("agent {agent} cannot advance to non-finite time {time}")]
    NonFinite {
        /// The agent being advanced.
        agent: AgentId,
        /// The rejected time.
        time: Time,
    },

    /// The proposed time does not move the clock forward.
    ///
    /// In a running simulation this usually means the agent's `timeStep`
    /// is not larger than `simulation.read_offset`, so its snapshot was
    /// read from an older interval.
    #[error(
        "agent {agent} cannot move from {current} to {proposed} \
         (is its timeStep smaller than simulation.read_offset?)"
    )]
    Regression {
        /// The agent being advanced.
        agent: AgentId,
        /// The clock's current value.
        current: Time,
        /// The rejected time.
        proposed: Time,
    },
}

/// One monotonically increasing clock per agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentClocks {
    clocks: BTreeMap<AgentId, Time>,
}

impl AgentClocks {
    /// Create clocks seeded with each agent's initial time.
    pub fn new(initial: impl IntoIterator<Item = (AgentId, Time)>) -> Self {
        Self {
            clocks: initial.into_iter().collect(),
        }
    }

    /// Return the clock of `agent`, if it has one.
    pub fn get(&self, agent: &AgentId) -> Option<Time> {
        self.clocks.get(agent).copied()
    }

    /// Move `agent`'s clock to `time`. Returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::UnknownAgent`] if the agent has no clock,
    /// [`ClockError::NonFinite`] for NaN or infinite times, and
    /// [`ClockError::Regression`] unless `time` is strictly greater than
    /// the current value.
    pub fn advance(&mut self, agent: &AgentId, time: Time) -> Result<Time, ClockError> {
        let clock = self
            .clocks
            .get_mut(agent)
            .ok_or_else(|| ClockError::UnknownAgent {
                agent: agent.clone(),
            })?;
        if !time.is_finite() {
            return Err(ClockError::NonFinite {
                agent: agent.clone(),
                time,
            });
        }
        if time <= *clock {
            return Err(ClockError::Regression {
                agent: agent.clone(),
                current: *clock,
                proposed: time,
            });
        }
        Ok(std::mem::replace(clock, time))
    }

    /// Iterate `(agent, clock)` pairs in agent order.
    pub fn iter(&self) -> impl Iterator<Item = (&AgentId, Time)> {
        self.clocks.iter().map(|(agent, time)| (agent, *time))
    }

    /// Number of clocks.
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Whether there are no clocks.
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn clocks() -> AgentClocks {
        AgentClocks::new([(AgentId::new("Body1"), 0.0), (AgentId::new("Body2"), 0.5)])
    }

    #[test]
    fn advance_moves_forward() {
        let mut clocks = clocks();
        let body1 = AgentId::new("Body1");
        let previous = clocks.advance(&body1, 0.25).unwrap();
        assert!(previous.abs() < f64::EPSILON);
        assert_eq!(clocks.get(&body1), Some(0.25));
        assert_eq!(clocks.get(&AgentId::new("Body2")), Some(0.5));
    }

    #[test]
    fn advance_rejects_regression_and_standstill() {
        let mut clocks = clocks();
        let body2 = AgentId::new("Body2");
        assert!(matches!(
            clocks.advance(&body2, 0.5),
            Err(ClockError::Regression { .. })
        ));
        assert!(matches!(
            clocks.advance(&body2, 0.1),
            Err(ClockError::Regression { .. })
        ));
        assert_eq!(clocks.get(&body2), Some(0.5));
    }

    #[test]
    fn regression_message_names_the_read_offset() {
        let mut clocks = clocks();
        let err = clocks.advance(&AgentId::new("Body2"), 0.5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "agent Body2 cannot move from 0.5 to 0.5 \
             (is its timeStep smaller than simulation.read_offset?)"
        );
    }

    #[test]
    fn advance_rejects_non_finite() {
        let mut clocks = clocks();
        let body1 = AgentId::new("Body1");
        assert!(matches!(
            clocks.advance(&body1, f64::NAN),
            Err(ClockError::NonFinite { .. })
        ));
        assert!(matches!(
            clocks.advance(&body1, f64::INFINITY),
            Err(ClockError::NonFinite { .. })
        ));
    }

    #[test]
    fn unknown_agent_is_reported() {
        let mut clocks = clocks();
        let result = clocks.advance(&AgentId::new("Body3"), 1.0);
        assert!(matches!(result, Err(ClockError::UnknownAgent { .. })));
    }

    #[test]
    fn iter_is_in_agent_order() {
        let clocks = clocks();
        let names: Vec<&str> = clocks.iter().map(|(agent, _)| agent.as_str()).collect();
        assert_eq!(names, vec!["Body1", "Body2"]);
        assert_eq!(clocks.len(), 2);
        assert!(!clocks.is_empty());
    }
}
