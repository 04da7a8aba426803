// Keyboard teleop: WASD drive, K kill switch, R/F throttle limit, Q quit
//
// Publishes `JoystickState` samples on the teleop topic, laid out like a
// gamepad so the runtime's default axis mapping applies. Run the mower with
// `--input remote` to drive it from here.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use mower_drive::config::{KILL_SWITCH_BUTTON, TOPIC_TELEOP};
use mower_drive::messages::JoystickState;
use std::time::{Duration, Instant};
use tracing::info;

const THROTTLE_LIMITS: [f32; 3] = [0.3, 0.6, 1.0];
const INPUT_TIMEOUT_MS: u64 = 150; // Release the sticks after this much time with no input
const AXIS_COUNT: usize = 6;
const BUTTON_COUNT: usize = 11;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_TELEOP).await?;

    info!("Controls: W/S=forward/back, A/D=steer, K=kill switch, R/F=limit, Q=quit");
    print_limit(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut limit_idx: usize = 0;

    let mut forward = 0.0f32;
    let mut steer = 0.0f32;
    let mut kill_switch_until = Instant::now();
    let mut last_movement_input = Instant::now();

    loop {
        // 20ms poll keeps publishing near the loop rate
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let limit = THROTTLE_LIMITS[limit_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        forward = limit;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        forward = -limit;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        steer = -limit;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        steer = limit;
                        last_movement_input = Instant::now();
                    }

                    // Held long enough to pass the mower's debounce window
                    KeyCode::Char('k') if kind == KeyEventKind::Press => {
                        kill_switch_until = Instant::now() + Duration::from_millis(200);
                    }

                    KeyCode::Char('r') if pressed => {
                        limit_idx = (limit_idx + 1).min(THROTTLE_LIMITS.len() - 1);
                        print_limit(limit_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        limit_idx = limit_idx.saturating_sub(1);
                        print_limit(limit_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            forward = 0.0;
            steer = 0.0;
        }

        let mut axes = vec![0.0; AXIS_COUNT];
        axes[0] = steer;
        axes[1] = forward;
        let mut buttons = vec![false; BUTTON_COUNT];
        buttons[KILL_SWITCH_BUTTON] = Instant::now() < kill_switch_until;

        let state = JoystickState::new(axes, buttons);
        publisher.put(serde_json::to_string(&state)?).await?;
    }

    // Leave the mower centered
    let idle = JoystickState::new(vec![0.0; AXIS_COUNT], vec![false; BUTTON_COUNT]);
    publisher.put(serde_json::to_string(&idle)?).await?;
    Ok(())
}

fn print_limit(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Throttle limit: {}", label);
}
