//! Two-slot comparison session.
//!
//! A session holds the two uploaded pages and the overlay viewport. Each slot
//! stores an `Arc<RasterPage>` snapshot; loading a new page swaps the `Arc`
//! and never touches the old page, so work still running on a previous
//! snapshot keeps a valid page and simply finishes against stale input.
//!
//! Every slot change bumps a generation counter. Long-running work records
//! [`PagePair::generation`] when it starts and checks
//! [`Session::is_current`] before publishing its result.

use crate::config::AnalysisConfig;
use crate::error::LabelScanError;
use crate::pipeline::diff::{diff_with_config, DiffMask};
use crate::pipeline::overlay::{OverlayCompositor, OverlayEvent, OverlayFrame};
use crate::pipeline::render::RasterPage;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
        }
    }
}

/// Both pages of a session, captured at one generation.
#[derive(Debug, Clone)]
pub struct PagePair {
    pub first: Arc<RasterPage>,
    pub second: Arc<RasterPage>,
    pub generation: u64,
}

/// Inputs a frontend feeds into the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Load { slot: Slot, page: Arc<RasterPage> },
    Clear(Slot),
    Overlay(OverlayEvent),
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    slots: [Option<Arc<RasterPage>>; 2],
    generation: u64,
    compositor: OverlayCompositor,
}

impl Session {
    pub fn new(container_width: f32, container_height: f32) -> Self {
        Self {
            slots: [None, None],
            generation: 0,
            compositor: OverlayCompositor::new(container_width, container_height),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page(&self, slot: Slot) -> Option<&Arc<RasterPage>> {
        self.slots[slot.index()].as_ref()
    }

    pub fn compositor(&self) -> &OverlayCompositor {
        &self.compositor
    }

    /// Put a page into a slot. Returns the new generation.
    ///
    /// The viewport is reset because the pair on screen changed.
    pub fn load(&mut self, slot: Slot, page: Arc<RasterPage>) -> u64 {
        debug!(
            "Session: {:?} ← '{}' ({}x{})",
            slot,
            page.source().name,
            page.width(),
            page.height()
        );
        self.slots[slot.index()] = Some(page);
        self.compositor.reset();
        self.bump()
    }

    /// Empty a slot. Returns the new generation.
    pub fn clear(&mut self, slot: Slot) -> u64 {
        self.slots[slot.index()] = None;
        self.compositor.reset();
        self.bump()
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// True while no slot has changed since `generation` was observed.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Both pages, if both slots are filled.
    pub fn pair(&self) -> Option<PagePair> {
        match (&self.slots[0], &self.slots[1]) {
            (Some(a), Some(b)) => Some(PagePair {
                first: Arc::clone(a),
                second: Arc::clone(b),
                generation: self.generation,
            }),
            _ => None,
        }
    }

    fn require_pair(&self) -> Result<PagePair, LabelScanError> {
        self.pair().ok_or_else(|| LabelScanError::MissingInput {
            what: "both slots must hold a page".to_string(),
        })
    }

    /// Apply an event. Returns true when the view needs redrawing.
    pub fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Load { slot, page } => {
                self.load(slot, page);
                true
            }
            SessionEvent::Clear(slot) => {
                self.clear(slot);
                true
            }
            SessionEvent::Overlay(e) => self.compositor.handle(e),
        }
    }

    /// Diff mask of the current pair at the configured threshold.
    pub fn diff(&self, config: &AnalysisConfig) -> Result<DiffMask, LabelScanError> {
        let pair = self.require_pair()?;
        Ok(diff_with_config(&pair.first, &pair.second, config))
    }

    /// Overlay of the current pair under the current viewport.
    pub fn overlay_frame(&self) -> Result<OverlayFrame, LabelScanError> {
        let pair = self.require_pair()?;
        crate::pipeline::overlay::composite(
            &pair.first,
            &pair.second,
            self.compositor.opacity(),
            self.compositor.transform(),
            self.compositor.container(),
        )
    }
}
