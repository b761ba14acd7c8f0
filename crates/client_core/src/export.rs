//! Calibration exporter: a pure transform from the commanded-angle snapshot
//! to a standalone replay script for the device side.

use std::fmt::Write as _;

use shared::domain::Servo;

/// Spacing between replayed moves, in milliseconds.
pub const REPLAY_SPACING_MS: u64 = 300;

/// Ordered `channel -> angle` mapping captured from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationExport {
    entries: Vec<(u8, i32)>,
}

impl CalibrationExport {
    /// Captures the snapshot in ascending channel order.
    pub fn from_servos(servos: &[Servo]) -> Self {
        let mut entries: Vec<(u8, i32)> = servos
            .iter()
            .map(|servo| (servo.config.channel.0, servo.angle))
            .collect();
        entries.sort_by_key(|(channel, _)| *channel);
        Self { entries }
    }

    /// The embedded mapping, ascending by channel.
    pub fn entries(&self) -> &[(u8, i32)] {
        &self.entries
    }

    /// Renders the device-side replay script. The device runs the same
    /// Python servo driver the control server wraps, so the artifact is a
    /// Python program: it applies each angle once in channel order, waits
    /// the fixed spacing between steps, prints per-step progress, keeps
    /// going past per-step failures, and exits cleanly on Ctrl-C.
    pub fn render_script(&self) -> String {
        let mut script = String::new();
        script.push_str("#!/usr/bin/env python3\n");
        script.push_str("# Generated calibration replay. Run on the device, next to its servo driver.\n");
        script.push_str("import sys\nimport time\n\nfrom servo import Servo\n\n");
        let _ = writeln!(script, "STEP_DELAY = {:.1}", REPLAY_SPACING_MS as f64 / 1000.0);
        script.push_str("\nCALIBRATION = [\n");
        for (channel, angle) in &self.entries {
            let _ = writeln!(script, "    ({channel}, {angle}),");
        }
        script.push_str("]\n\n");
        script.push_str(concat!(
            "\n",
            "def main():\n",
            "    try:\n",
            "        controller = Servo()\n",
            "    except Exception as exc:\n",
            "        print(f\"failed to initialize servo driver: {exc}\")\n",
            "        return 1\n",
            "\n",
            "    failures = 0\n",
            "    for channel, angle in CALIBRATION:\n",
            "        try:\n",
            "            controller.set_servo_pwm(str(channel), angle)\n",
            "            print(f\"servo {channel} -> {angle} deg\")\n",
            "        except Exception as exc:\n",
            "            failures += 1\n",
            "            print(f\"servo {channel}: {exc}\")\n",
            "        time.sleep(STEP_DELAY)\n",
            "\n",
            "    if failures:\n",
            "        print(f\"done, {failures} step(s) failed\")\n",
            "        return 1\n",
            "    print(\"calibration applied\")\n",
            "    return 0\n",
            "\n",
            "\n",
            "if __name__ == \"__main__\":\n",
            "    try:\n",
            "        sys.exit(main())\n",
            "    except KeyboardInterrupt:\n",
            "        print(\"\\ninterrupted\")\n",
            "        sys.exit(130)\n",
        ));
        script
    }
}
