//! Fixed UI positions and colours, measured on a 1920x1080 client area.

use crate::vision::Bgr;

/// A reference-resolution point.
pub type RefPoint = (i32, i32);

/// Top-left HUD marker that is only drawn on the main game view.
pub const MAIN_PAGE: RefPoint = (22, 63);
pub const MAIN_PAGE_COLOR: Bgr = [237, 166, 62];
pub const MAIN_PAGE_TOLERANCE: u32 = 30;

/// White while inside a dungeon; clicking it starts the exit.
pub const EXIT_CHECK: RefPoint = (267, 65);

pub const WORLD_BOSS_ENTRY: RefPoint = (350, 940);
pub const AUTO_COMBAT: RefPoint = (1160, 930);

/// Both pixels match exactly while the boss banner is up.
pub const BOSS_BANNER: [(RefPoint, Bgr); 2] =
    [((1216, 157), [161, 209, 47]), ((22, 410), [237, 166, 62])];
/// Additionally white while the boss is still alive.
pub const BOSS_ALIVE_MARKER: RefPoint = (758, 974);

/// Avatar status indicator; off-colour when stuck in a non-interactive state.
pub const CHARACTER_STATE: RefPoint = (1805, 698);
pub const CHARACTER_STATE_COLOR: Bgr = [254, 195, 57];
pub const CHARACTER_STATE_MAX_DISTANCE: u32 = 50;

/// Interaction prompt text region, two corners.
pub const PROMPT_REGION: (RefPoint, RefPoint) = ((1110, 520), (1280, 575));

pub const REWARD: RefPoint = (1255, 575);

pub mod labels {
    pub const BACK: &str = "back";
    pub const CONFIRM: &str = "confirm";
    pub const GOTO_BOSS: &str = "gotoboss";
    pub const SHENLIN: &str = "shenlin";
    pub const OPEN_CHEST: [&str; 2] = ["openchest1", "openchest2"];
}
