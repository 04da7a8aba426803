// Gamepad input through gilrs
//
// gilrs reports named axes and buttons; the drive loop works with indices,
// so both are laid out in a fixed order (Xbox-style pads):
//   axes:    0 LeftStickX, 1 LeftStickY, 2 RightStickX, 3 RightStickY,
//            4 LeftZ, 5 RightZ
//   buttons: 0 South(A), 1 East(B), 2 West(X), 3 North(Y),
//            4 LeftTrigger(LB), 5 RightTrigger(RB), 6 Select(View),
//            7 Start(Menu), 8 Mode(Guide), 9 LeftThumb, 10 RightThumb
// gilrs reports "stick up" as positive Y.

use gilrs::{Axis, Button, Gamepad, GamepadId, Gilrs};
use tracing::{debug, info, warn};

use super::{InputError, Joystick};
use crate::messages::JoystickState;

pub const AXIS_ORDER: [Axis; 6] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::RightStickX,
    Axis::RightStickY,
    Axis::LeftZ,
    Axis::RightZ,
];

pub const BUTTON_ORDER: [Button; 11] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
];

/// First connected gamepad, re-probed whenever it disappears
pub struct GamepadInput {
    gilrs: Gilrs,
    active: Option<GamepadId>,
}

impl GamepadInput {
    pub fn new() -> Result<Self, InputError> {
        info!("Initializing gilrs controller interface");
        let gilrs = Gilrs::new().map_err(|e| InputError::Backend(e.to_string()))?;
        Ok(Self {
            gilrs,
            active: None,
        })
    }

    fn select_gamepad(&mut self) -> Option<GamepadId> {
        if let Some(id) = self.active {
            if self.gilrs.connected_gamepad(id).is_some() {
                return Some(id);
            }
            warn!("Gamepad {} disconnected", id);
            self.active = None;
        }

        let (id, gamepad) = self.gilrs.gamepads().next()?;
        info!("Using gamepad {}: {}", id, gamepad.name());
        self.active = Some(id);
        Some(id)
    }
}

fn snapshot(gamepad: &Gamepad<'_>) -> JoystickState {
    JoystickState {
        axes: AXIS_ORDER.iter().map(|&axis| gamepad.value(axis)).collect(),
        buttons: BUTTON_ORDER
            .iter()
            .map(|&button| gamepad.is_pressed(button))
            .collect(),
    }
}

impl Joystick for GamepadInput {
    fn poll(&mut self) -> Result<JoystickState, InputError> {
        // Pump the event queue so cached gamepad state is current
        while let Some(event) = self.gilrs.next_event() {
            debug!("Gamepad event: {:?}", event.event);
        }

        let id = self
            .select_gamepad()
            .ok_or_else(|| InputError::Unavailable("no gamepad connected".to_string()))?;
        let gamepad = self
            .gilrs
            .connected_gamepad(id)
            .ok_or_else(|| InputError::Unavailable(format!("gamepad {} disconnected", id)))?;
        Ok(snapshot(&gamepad))
    }
}

/// Connected gamepads as (index, name)
pub fn list_gamepads() -> Result<Vec<(usize, String)>, InputError> {
    let gilrs = Gilrs::new().map_err(|e| InputError::Backend(e.to_string()))?;
    Ok(gilrs
        .gamepads()
        .enumerate()
        .map(|(i, (_, gamepad))| (i, gamepad.name().to_string()))
        .collect())
}
