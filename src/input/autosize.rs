//! Keeps an input surface tall enough for its content.
use std::cell::Cell;
use std::rc::Rc;

use super::surface::{InputSurface, Subscription};

/// Sizing parameters, in pixels (or rows, for a terminal host).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutosizeConfig {
    pub min_height: u32,
    pub line_height: u32,
    pub padding: u32,
    pub border: u32,
}

impl Default for AutosizeConfig {
    fn default() -> Self {
        Self {
            min_height: 20,
            line_height: 20,
            padding: 8,
            border: 0,
        }
    }
}

impl AutosizeConfig {
    /// The sizing used by the chat prompt.
    pub fn prompt() -> Self {
        Self {
            min_height: 28,
            padding: 4,
            ..Self::default()
        }
    }

    /// `min_height + line breaks * line_height + padding + border`.
    ///
    /// There is no maximum here. Clamping is up to the host layout.
    pub fn target_height(&self, content: &str) -> u32 {
        let line_breaks = content.bytes().filter(|b| *b == b'\n').count();
        let line_breaks = u32::try_from(line_breaks).unwrap_or(u32::MAX);

        self.min_height
            .saturating_add(line_breaks.saturating_mul(self.line_height))
            .saturating_add(self.padding)
            .saturating_add(self.border)
    }
}

/// Recomputes the target height on every content change of the
/// surface it is attached to.
pub struct AutosizeController {
    config: AutosizeConfig,
    height: Rc<Cell<u32>>,
    _subscription: Subscription,
}

impl AutosizeController {
    pub fn attach(surface: &InputSurface, config: AutosizeConfig) -> Self {
        let height = Rc::new(Cell::new(config.target_height(surface.content())));
        let target = Rc::clone(&height);
        let subscription = surface.subscribe(move |content| {
            let next = config.target_height(content);
            if target.replace(next) != next {
                tracing::debug!("Input height changed to {}", next);
            }
        });

        Self {
            config,
            height,
            _subscription: subscription,
        }
    }

    pub fn config(&self) -> AutosizeConfig {
        self.config
    }

    pub fn height(&self) -> u32 {
        self.height.get()
    }
}
