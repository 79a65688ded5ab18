//! Show/hide/pin lifecycle of the character tooltips.
//!
//! The controller is a plain state machine: callers feed it pointer and click
//! events together with the current [`Instant`], call [`TooltipController::tick`]
//! to let the hide timer fire, and perform the supplementary fetches it asks
//! for. Nothing here touches a clock or the network on its own.

use crate::config::TooltipConfig;
use crate::document::{ElementId, Table};
use crate::error::SupplementaryContentError;
use crate::lexicon::{Lexicon, SupplementaryIndex};
use crate::render::{ToggleBody, TooltipContent, render_toggle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooltipState {
    Idle,
    Loading,
    Shown,
    Pinned,
    Hiding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplementaryToggle {
    pub character: char,
    pub body: ToggleBody,
    pub expanded: bool,
}

/// Per-element tooltip state, created on first activation.
#[derive(Debug, Clone)]
pub struct TooltipSession {
    element: ElementId,
    state: TooltipState,
    content: Option<TooltipContent>,
    toggles: Vec<SupplementaryToggle>,
    pending: Vec<char>,
    pinned: bool,
    visible: bool,
    shown_at: Option<Instant>,
}

impl TooltipSession {
    fn new(element: ElementId) -> Self {
        Self {
            element,
            state: TooltipState::Idle,
            content: None,
            toggles: Vec::new(),
            pending: Vec::new(),
            pinned: false,
            visible: false,
            shown_at: None,
        }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn state(&self) -> TooltipState {
        self.state
    }

    pub fn content_loaded(&self) -> bool {
        self.content.is_some()
    }

    pub fn content(&self) -> Option<&TooltipContent> {
        self.content.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// When the tooltip last became visible.
    pub fn shown_at(&self) -> Option<Instant> {
        self.shown_at
    }

    pub fn toggles(&self) -> &[SupplementaryToggle] {
        &self.toggles
    }

    /// Characters whose supplementary content has not arrived yet.
    pub fn pending(&self) -> &[char] {
        &self.pending
    }

    fn collapse_toggles(&mut self) {
        for toggle in &mut self.toggles {
            toggle.expanded = false;
        }
    }

    fn hide(&mut self) {
        self.collapse_toggles();
        self.visible = false;
        self.pinned = false;
        self.state = TooltipState::Idle;
    }
}

/// A fetch the host must perform and report back through
/// [`TooltipController::supplementary_loaded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplementaryRequest {
    pub element: ElementId,
    pub character: char,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Another tooltip is pinned; this element may not open.
    Suppressed,
    /// The element was never attached to this controller.
    Detached,
    Shown {
        /// Tooltip that was closed to keep a single one visible.
        replaced: Option<ElementId>,
        requests: Vec<SupplementaryRequest>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// Inside the tooltip body of an element.
    Tooltip(ElementId),
    /// On the n-th supplementary toggle of an element's tooltip.
    Toggle(ElementId, usize),
    /// On a character span itself.
    Character(ElementId),
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HideTimer {
    element: ElementId,
    deadline: Instant,
}

/// Shared tooltip state: which tooltip is active, whether others are blocked,
/// and the pending hide timer.
#[derive(Debug, Clone, Default)]
pub struct TooltipContext {
    active: Option<ElementId>,
    block_others: bool,
    hide_timer: Option<HideTimer>,
}

impl TooltipContext {
    pub fn active(&self) -> Option<ElementId> {
        self.active
    }

    pub fn others_blocked(&self) -> bool {
        self.block_others
    }

    pub fn hide_deadline(&self) -> Option<Instant> {
        self.hide_timer.map(|timer| timer.deadline)
    }
}

pub struct TooltipController {
    config: TooltipConfig,
    lexicon: Arc<Lexicon>,
    index: Arc<SupplementaryIndex>,
    elements: HashMap<ElementId, String>,
    sessions: HashMap<ElementId, TooltipSession>,
    context: TooltipContext,
}

impl TooltipController {
    pub fn new(
        config: TooltipConfig,
        lexicon: Arc<Lexicon>,
        index: Arc<SupplementaryIndex>,
    ) -> Self {
        Self {
            config,
            lexicon,
            index,
            elements: HashMap::new(),
            sessions: HashMap::new(),
            context: TooltipContext::default(),
        }
    }

    /// Registers every character span of an annotated table.
    pub fn attach(&mut self, table: &Table) -> usize {
        let before = self.elements.len();
        for (element, text) in table.characters() {
            self.elements.insert(element, text.to_string());
        }
        self.elements.len() - before
    }

    pub fn context(&self) -> &TooltipContext {
        &self.context
    }

    pub fn session(&self, element: ElementId) -> Option<&TooltipSession> {
        self.sessions.get(&element)
    }

    pub fn visible(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.sessions
            .values()
            .filter(|session| session.visible)
            .map(|session| session.element)
    }

    pub fn pointer_enter(&mut self, element: ElementId, now: Instant) -> Activation {
        let Some(text) = self.elements.get(&element).cloned() else {
            return Activation::Detached;
        };
        if self.context.block_others && self.context.active != Some(element) {
            debug!(element = element.0, "activation suppressed by pinned tooltip");
            return Activation::Suppressed;
        }

        let mut replaced = None;
        match self.context.active {
            Some(previous) if previous != element => {
                if let Some(session) = self.sessions.get_mut(&previous) {
                    session.hide();
                }
                self.context.hide_timer = None;
                replaced = Some(previous);
            }
            Some(_) => {
                self.cancel_timer_for(element);
            }
            None => {}
        }

        let session = self
            .sessions
            .entry(element)
            .or_insert_with(|| TooltipSession::new(element));
        let mut requests = Vec::new();
        if session.content.is_none() {
            session.state = TooltipState::Loading;
            let content = TooltipContent::build(&text, &self.lexicon, &self.config);
            for &character in &content.characters {
                if let Some(path) = self.index.path_for(character) {
                    session.pending.push(character);
                    requests.push(SupplementaryRequest {
                        element,
                        character,
                        path: path.to_string(),
                    });
                }
            }
            session.content = Some(content);
        }
        if !session.visible {
            session.shown_at = Some(now);
        }
        session.visible = true;
        session.state = if session.pinned {
            TooltipState::Pinned
        } else {
            TooltipState::Shown
        };
        self.context.active = Some(element);
        debug!(element = element.0, requests = requests.len(), "tooltip shown");
        Activation::Shown { replaced, requests }
    }

    /// Starts the hide timer unless tooltips are pinned. Returns whether a
    /// timer was started.
    pub fn pointer_leave(&mut self, element: ElementId, now: Instant) -> bool {
        if self.context.block_others || self.context.active != Some(element) {
            return false;
        }
        self.start_hide_timer(element, now);
        true
    }

    /// Fires the hide timer if its deadline has passed. Returns the element
    /// that was hidden.
    pub fn tick(&mut self, now: Instant) -> Option<ElementId> {
        let timer = self.context.hide_timer?;
        if now < timer.deadline {
            return None;
        }
        self.context.hide_timer = None;
        if self.context.block_others || self.context.active != Some(timer.element) {
            return None;
        }
        if let Some(session) = self.sessions.get_mut(&timer.element) {
            session.hide();
        }
        self.context.active = None;
        debug!(element = timer.element.0, "tooltip hidden");
        Some(timer.element)
    }

    pub fn click(&mut self, target: ClickTarget, now: Instant) {
        match target {
            ClickTarget::Tooltip(element) => {
                self.pin(element);
            }
            ClickTarget::Toggle(element, index) => {
                if self.pin(element) {
                    if let Some(toggle) = self
                        .sessions
                        .get_mut(&element)
                        .and_then(|session| session.toggles.get_mut(index))
                    {
                        toggle.expanded = !toggle.expanded;
                    }
                }
            }
            ClickTarget::Character(_) => {}
            ClickTarget::Outside => {
                self.context.block_others = false;
                for session in self.sessions.values_mut() {
                    session.pinned = false;
                }
                if let Some(active) = self.context.active {
                    if let Some(session) = self.sessions.get_mut(&active) {
                        session.collapse_toggles();
                    }
                    self.start_hide_timer(active, now);
                }
            }
        }
    }

    /// Records the outcome of a supplementary fetch. Results for sessions that
    /// no longer exist are dropped.
    pub fn supplementary_loaded(
        &mut self,
        request: &SupplementaryRequest,
        result: Result<String, SupplementaryContentError>,
    ) {
        let Some(session) = self.sessions.get_mut(&request.element) else {
            debug!(element = request.element.0, "dropping supplementary result for unknown session");
            return;
        };
        let Some(position) = session
            .pending
            .iter()
            .position(|ch| *ch == request.character)
        else {
            return;
        };
        session.pending.remove(position);
        let body = match result {
            Ok(html) if html.trim().is_empty() => return,
            Ok(html) => ToggleBody::Loaded(html),
            Err(err) => ToggleBody::Failed(err.to_string()),
        };
        session.toggles.push(SupplementaryToggle {
            character: request.character,
            body,
            expanded: false,
        });
        if let Some(content) = &session.content {
            let order = &content.characters;
            session.toggles.sort_by_key(|toggle| {
                order
                    .iter()
                    .position(|ch| *ch == toggle.character)
                    .unwrap_or(usize::MAX)
            });
        }
    }

    /// Full tooltip markup: lexical content followed by any toggles.
    pub fn html(&self, element: ElementId) -> Option<String> {
        let session = self.sessions.get(&element)?;
        let content = session.content.as_ref()?;
        let mut html = content.html.clone();
        for toggle in &session.toggles {
            html.push_str(&render_toggle(
                &self.config.supplementary_label,
                toggle.character,
                toggle.expanded,
                &toggle.body,
            ));
        }
        Some(html)
    }

    /// Width for an element's tooltip, clamped to the configured fractions of
    /// the viewport.
    pub fn width(&self, element: ElementId, viewport: f32, measure: &impl Measure) -> Option<f32> {
        let html = self.html(element)?;
        Some(clamp_width(measure.width(&html), viewport, &self.config))
    }

    fn pin(&mut self, element: ElementId) -> bool {
        if self.context.active != Some(element) {
            return false;
        }
        self.context.block_others = true;
        self.cancel_timer_for(element);
        if let Some(session) = self.sessions.get_mut(&element) {
            session.pinned = true;
            session.state = TooltipState::Pinned;
        }
        debug!(element = element.0, "tooltip pinned");
        true
    }

    fn start_hide_timer(&mut self, element: ElementId, now: Instant) {
        self.context.hide_timer = Some(HideTimer {
            element,
            deadline: now + self.config.hide_delay,
        });
        if let Some(session) = self.sessions.get_mut(&element) {
            session.state = TooltipState::Hiding;
        }
    }

    fn cancel_timer_for(&mut self, element: ElementId) {
        if self
            .context
            .hide_timer
            .is_some_and(|timer| timer.element == element)
        {
            self.context.hide_timer = None;
            if let Some(session) = self.sessions.get_mut(&element) {
                if session.visible {
                    session.state = if session.pinned {
                        TooltipState::Pinned
                    } else {
                        TooltipState::Shown
                    };
                }
            }
        }
    }
}

/// Measures rendered tooltip content off-screen.
pub trait Measure {
    fn width(&self, html: &str) -> f32;
}

/// Estimates width from the longest text line: wide (CJK) characters take a
/// full cell, everything else half a cell.
#[derive(Debug, Clone, Copy)]
pub struct CharCellMeasure {
    pub cell: f32,
    pub padding: f32,
}

impl Default for CharCellMeasure {
    fn default() -> Self {
        Self {
            cell: 16.0,
            padding: 24.0,
        }
    }
}

impl Measure for CharCellMeasure {
    fn width(&self, html: &str) -> f32 {
        let mut longest = 0.0f32;
        let mut current = 0.0f32;
        let mut in_tag = false;
        let mut tag = String::new();
        for ch in html.chars() {
            match ch {
                '<' => {
                    in_tag = true;
                    tag.clear();
                }
                '>' if in_tag => {
                    in_tag = false;
                    let name = tag.trim_start_matches('/');
                    if ["p", "h3", "h4", "div", "br"]
                        .iter()
                        .any(|block| name.split_whitespace().next() == Some(*block))
                    {
                        longest = longest.max(current);
                        current = 0.0;
                    }
                }
                _ if in_tag => tag.push(ch),
                _ => current += if ch.is_ascii() { 0.5 } else { 1.0 },
            }
        }
        longest.max(current) * self.cell + self.padding
    }
}

pub fn clamp_width(measured: f32, viewport: f32, config: &TooltipConfig) -> f32 {
    let min = viewport * config.min_width_fraction;
    let max = viewport * config.max_width_fraction;
    if !min.is_finite() || !max.is_finite() {
        return measured;
    }
    measured.clamp(min, max.max(min))
}
