/// Queue families and queue roles.
///
/// The engine talks about queues by role (graphics, compute, transfer).
/// Several roles may resolve to the same hardware family; cross-queue
/// ownership transfer only happens when they differ.

use bitflags::bitflags;
use crate::error::{Error, Result};

bitflags! {
    /// Capabilities advertised by a hardware queue family
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueCapabilities: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE  = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

/// Logical queue role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    Graphics,
    Compute,
    Transfer,
}

/// Family index chosen for each role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Every role on one family
    pub fn unified(family: u32) -> Self {
        Self { graphics: family, present: family, compute: family, transfer: family }
    }

    /// Pick families from the advertised capability list.
    ///
    /// - graphics: first family with graphics
    /// - present: the graphics family if it can present, else the first that can
    /// - compute: first compute family without graphics, else graphics
    /// - transfer: first transfer family without graphics or compute, else compute
    pub fn select(
        families: &[QueueCapabilities],
        supports_present: impl Fn(u32) -> bool,
    ) -> Result<Self> {
        let position = |pred: &dyn Fn(QueueCapabilities) -> bool| {
            families.iter().position(|caps| pred(*caps)).map(|i| i as u32)
        };

        let graphics = position(&|caps| caps.contains(QueueCapabilities::GRAPHICS))
            .ok_or_else(|| {
                Error::InitializationFailed("No queue family with graphics support".to_string())
            })?;

        let present = if supports_present(graphics) {
            graphics
        } else {
            (0..families.len() as u32)
                .find(|&i| supports_present(i))
                .ok_or_else(|| {
                    Error::InitializationFailed("No queue family can present".to_string())
                })?
        };

        let compute = position(&|caps| {
            caps.contains(QueueCapabilities::COMPUTE) && !caps.contains(QueueCapabilities::GRAPHICS)
        })
        .unwrap_or(graphics);

        let transfer = position(&|caps| {
            caps.contains(QueueCapabilities::TRANSFER)
                && !caps.intersects(QueueCapabilities::GRAPHICS | QueueCapabilities::COMPUTE)
        })
        .unwrap_or(compute);

        Ok(Self { graphics, present, compute, transfer })
    }

    pub fn family(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Graphics => self.graphics,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
        }
    }

    /// Whether uploads cross a family boundary
    pub fn has_dedicated_transfer(&self) -> bool {
        self.transfer != self.graphics
    }

    /// Distinct families used by the graphics, compute and transfer roles,
    /// in ascending order
    pub fn distinct_families(&self) -> Vec<u32> {
        let mut families = vec![self.graphics, self.compute, self.transfer];
        families.sort_unstable();
        families.dedup();
        families
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
