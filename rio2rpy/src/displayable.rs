// displayable.rs - Tracked display objects
//
// Background, foreground and object images with their position, viewport,
// tint and pending keyframe timeline. Stubs stand in for objects drawn by
// hand-written Ren'Py code.

use crate::text::format_float;
use thiserror::Error;

/// Engine screen size
const SCREEN_WIDTH: f64 = 800.0;
const SCREEN_HEIGHT: f64 = 600.0;
/// Viewport center, the neutral pan position
const PAN_CENTER: (i64, i64) = (400, 300);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpriteError {
    #[error("animation of stub object `{0}` is not supported")]
    AnimateStub(String),
    #[error("cannot replace stub object `{0}`")]
    ReplaceStub(String),
}

/// What image coordinates are relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Position of the image on screen
    Screen,
    /// Position of the screen on the image (backgrounds)
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Linear,
    Shake,
}

/// One step of the pending animation, in absolute screen fractions
#[derive(Debug, Clone, PartialEq)]
struct KeyFrame {
    kind: FrameKind,
    duration: f64,
    xpos: Option<f64>,
    ypos: Option<f64>,
    alpha: Option<f64>,
}

/// An image tracked by the translator
#[derive(Debug, Clone, PartialEq)]
pub struct Displayable {
    name: String,
    origin: Origin,
    /// Position when the timeline starts
    base: (i64, i64),
    /// Position after the timeline
    pos: (i64, i64),
    zoom: i64,
    pan: (i64, i64),
    alpha: f64,
    key_frames: Vec<KeyFrame>,
    tint: i64,
    tint_reset: bool,
    dirty: bool,
}

impl Displayable {
    pub fn new(name: impl Into<String>, x: i64, y: i64, origin: Origin) -> Self {
        Self {
            name: name.into(),
            origin,
            base: (x, y),
            pos: (x, y),
            zoom: 100,
            pan: PAN_CENTER,
            alpha: 1.0,
            key_frames: Vec::new(),
            tint: 0,
            tint_reset: false,
            dirty: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tint(&self) -> i64 {
        self.tint
    }

    pub fn set_tint(&mut self, tint: i64) {
        if tint != self.tint {
            self.dirty = true;
            self.tint_reset = true;
        }
        self.tint = tint;
    }

    pub fn set_viewport(&mut self, zoom: i64, xpan: i64, ypan: i64) {
        if zoom != self.zoom || (xpan, ypan) != self.pan {
            self.dirty = true;
        }
        self.zoom = zoom;
        self.pan = (xpan, ypan);
    }

    /// Show another image or move this one; returns whether anything changed
    pub fn replace(&mut self, name: &str, x: i64, y: i64) -> bool {
        if self.name == name && self.base == (x, y) {
            return false;
        }
        self.key_frames.clear();
        self.name = name.to_string();
        self.base = (x, y);
        self.pos = (x, y);
        self.dirty = true;
        true
    }

    /// Append a relative move/fade to the pending timeline
    pub fn add_key_frame(&mut self, kind: FrameKind, dx: i64, dy: i64, duration_ms: i64, alpha: i64) {
        self.pos.0 += dx;
        self.pos.1 += dy;
        self.alpha += alpha as f64 / 255.0;
        self.key_frames.push(KeyFrame {
            kind,
            duration: duration_ms as f64 / 1000.0,
            xpos: (dx != 0).then(|| self.pos.0 as f64 / SCREEN_WIDTH),
            ypos: (dy != 0).then(|| self.pos.1 as f64 / SCREEN_HEIGHT),
            alpha: (alpha != 0).then_some(self.alpha),
        });
        self.dirty = true;
    }

    /// Commit the timeline's displacement into the base position
    pub fn flatten(&mut self) {
        self.key_frames.clear();
        self.base = self.pos;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_drawn(&mut self) {
        self.dirty = false;
        self.tint_reset = false;
    }

    fn oriented(&self, v: f64) -> f64 {
        match self.origin {
            Origin::Screen => v,
            Origin::Image => -v,
        }
    }

    /// ATL block describing the current state and pending timeline
    pub fn to_atl(&self, use_matrixcolor: bool) -> Vec<String> {
        let mut atl = Vec::new();
        let f = format_float;

        let x = self.oriented(self.base.0 as f64 / SCREEN_WIDTH);
        let y = self.oriented(self.base.1 as f64 / SCREEN_HEIGHT);
        if self.base.0 == 0 || self.base.1 == 0 {
            if self.base.0 != 0 {
                atl.push(format!("xpos {}", f(x)));
            }
            if self.base.1 != 0 {
                atl.push(format!("ypos {}", f(y)));
            }
        } else {
            atl.push(format!("pos ({}, {})", f(x), f(y)));
        }

        if self.zoom != 100 {
            atl.push(format!("zoom {}", f(self.zoom as f64 / 100.0)));
            if self.pan == PAN_CENTER {
                // Ren'Py pans from the top left corner
                atl.push("xpan 0.0".to_string());
                atl.push("ypan 0.0".to_string());
            } else {
                if self.pan.0 != PAN_CENTER.0 {
                    let xpan = 180.0 * ((self.pan.0 - PAN_CENTER.0) as f64 / 400.0);
                    atl.push(format!("xpan {}", f(xpan)));
                }
                if self.pan.1 != PAN_CENTER.1 {
                    let ypan = 180.0 * ((self.pan.1 - PAN_CENTER.1) as f64 / 300.0);
                    atl.push(format!("ypan {}", f(ypan)));
                }
            }
        }

        if use_matrixcolor && self.tint_reset {
            atl.push("matrixcolor None".to_string());
            if self.tint != 0 {
                atl.push(format!("matrixcolor WillTintTable({})", self.tint));
            }
        }

        for frame in &self.key_frames {
            if frame.kind == FrameKind::Shake {
                // Approximated by the plain move below
                atl.push("# shake".to_string());
            }
            let xpos = frame.xpos.map(|v| self.oriented(v));
            let ypos = frame.ypos.map(|v| self.oriented(v));
            let duration = f(frame.duration);
            let line = match (xpos, ypos) {
                (None, None) if frame.alpha.is_none() => format!("pause {}", duration),
                (Some(x), Some(y)) => format!("linear {} pos ({}, {})", duration, f(x), f(y)),
                _ => {
                    let mut parts = vec![format!("linear {}", duration)];
                    parts.extend(xpos.map(|x| format!("xpos {}", f(x))));
                    parts.extend(ypos.map(|y| format!("ypos {}", f(y))));
                    parts.join(" ")
                }
            };
            match frame.alpha {
                Some(alpha) => atl.push(format!("{} alpha {}", line, f(alpha))),
                None => atl.push(line),
            }
        }
        atl
    }
}

/// Placeholder for an object managed outside the generated script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    /// Tag the object is shown as, used to hide it
    pub reference: String,
}

/// Contents of a display slot
#[derive(Debug, Clone, PartialEq)]
pub enum Sprite {
    Image(Displayable),
    Stub(Stub),
}

impl Sprite {
    pub fn image(&self) -> Option<&Displayable> {
        match self {
            Sprite::Image(d) => Some(d),
            Sprite::Stub(_) => None,
        }
    }

    pub fn replace(&mut self, name: &str, x: i64, y: i64) -> Result<bool, SpriteError> {
        match self {
            Sprite::Image(d) => Ok(d.replace(name, x, y)),
            Sprite::Stub(s) => Err(SpriteError::ReplaceStub(s.reference.clone())),
        }
    }

    pub fn add_key_frame(
        &mut self,
        kind: FrameKind,
        dx: i64,
        dy: i64,
        duration_ms: i64,
        alpha: i64,
    ) -> Result<(), SpriteError> {
        match self {
            Sprite::Image(d) => {
                d.add_key_frame(kind, dx, dy, duration_ms, alpha);
                Ok(())
            }
            Sprite::Stub(s) => Err(SpriteError::AnimateStub(s.reference.clone())),
        }
    }

    pub fn set_tint(&mut self, tint: i64) {
        if let Sprite::Image(d) = self {
            d.set_tint(tint);
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Sprite::Image(d) => d.is_dirty(),
            Sprite::Stub(_) => false,
        }
    }

    pub fn flatten(&mut self) {
        if let Sprite::Image(d) = self {
            d.flatten();
        }
    }

    pub fn mark_drawn(&mut self) {
        if let Sprite::Image(d) = self {
            d.mark_drawn();
        }
    }
}

/// A slot's sprite plus its removal state
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub sprite: Sprite,
    /// Hide at the next flush
    pub pending_removal: bool,
}

impl Slot {
    pub fn new(sprite: Sprite) -> Self {
        Self {
            sprite,
            pending_removal: false,
        }
    }

    /// Replace the slot's image, cancelling a pending removal
    pub fn replace(&mut self, name: &str, x: i64, y: i64) -> Result<bool, SpriteError> {
        self.pending_removal = false;
        self.sprite.replace(name, x, y)
    }
}
