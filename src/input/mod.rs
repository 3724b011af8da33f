pub mod autosize;
pub mod keys;
pub mod prompts;
pub mod surface;

pub use autosize::{AutosizeConfig, AutosizeController};
pub use keys::{Key, KeyAction, KeyPress, key_action};
pub use prompts::{STARTER_PROMPTS, starter_prompt};
pub use surface::{InputSurface, Submittable, Subscription};
