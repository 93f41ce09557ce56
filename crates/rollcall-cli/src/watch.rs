//! Live recognition from a webcam.

use anyhow::{Context, Result};
use minifb::{Key, Window, WindowOptions};
use rollcall_facedb::{FaceDb, FaceDbConfig, FaceRegion, Recognition};
use rollcall_hw::Camera;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;

const KNOWN: u32 = 0x0000_ff00;
const UNKNOWN: u32 = 0x00ff_0000;

pub const UNRECOGNIZED: &str = "Unrecognized";

pub fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No capture devices found");
        return;
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}

/// Capture, recognize and display until the window is closed or `q`/Esc is
/// pressed. A capture failure ends the loop with an error.
pub fn run(config: &FaceDbConfig, device: &str) -> Result<()> {
    let mut db = FaceDb::open(config).context("failed to open face database")?;
    tracing::info!(faces = db.len()?, "face database ready");

    let camera = Camera::open(device, CAPTURE_WIDTH, CAPTURE_HEIGHT)?;
    let (width, height) = (camera.width as usize, camera.height as usize);
    tracing::info!(
        device,
        width,
        height,
        format = ?camera.pixel_format,
        "camera opened"
    );

    let mut window = Window::new("rollcall", width, height, WindowOptions::default())
        .context("failed to open window")?;
    window.set_target_fps(30);

    let mut stream = camera.stream()?;
    let mut buffer = vec![0u32; width * height];
    let mut shown: Vec<String> = Vec::new();

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        let frame = stream.next_frame().context("frame capture failed")?;
        if frame.is_dark {
            tracing::debug!(sequence = frame.sequence, "skipping dark frame");
            window.update();
            continue;
        }
        let Some(image) = frame.to_image() else {
            continue;
        };

        let faces = db.recognize_all(&image)?;
        gray_to_rgb(&frame.data, &mut buffer);
        for (region, recognition) in &faces {
            let color = if recognition.is_some() { KNOWN } else { UNKNOWN };
            draw_region(&mut buffer, width, height, region, color);
        }

        let names = labels(&faces);
        if names != shown {
            tracing::info!(sequence = frame.sequence, faces = ?names, "faces in view");
            window.set_title(&title(&names));
            shown = names;
        }

        window
            .update_with_buffer(&buffer, width, height)
            .context("failed to draw frame")?;
    }

    tracing::info!("watch stopped");
    Ok(())
}

/// One label per face: the recognized name or [`UNRECOGNIZED`].
pub fn labels(faces: &[(FaceRegion, Option<Recognition>)]) -> Vec<String> {
    faces
        .iter()
        .map(|(_, r)| match r {
            Some(r) => r.name.clone(),
            None => UNRECOGNIZED.to_string(),
        })
        .collect()
}

pub fn title(labels: &[String]) -> String {
    if labels.is_empty() {
        "rollcall".to_string()
    } else {
        format!("rollcall: {}", labels.join(", "))
    }
}

/// Expand luma into minifb's `0RGB` pixels.
fn gray_to_rgb(gray: &[u8], out: &mut [u32]) {
    for (dst, &y) in out.iter_mut().zip(gray) {
        let y = y as u32;
        *dst = (y << 16) | (y << 8) | y;
    }
}

/// Two-pixel outline of `region`, clipped to the frame.
fn draw_region(buffer: &mut [u32], width: usize, height: usize, region: &FaceRegion, color: u32) {
    let Some((x, y, w, h)) = region.clipped_rect(width as u32, height as u32) else {
        return;
    };
    let (x0, y0) = (x as usize, y as usize);
    let (x1, y1) = (x0 + w as usize - 1, y0 + h as usize - 1);

    for t in 0..2 {
        for px in x0..=x1 {
            put(buffer, width, px, (y0 + t).min(y1), color);
            put(buffer, width, px, y1.saturating_sub(t).max(y0), color);
        }
        for py in y0..=y1 {
            put(buffer, width, (x0 + t).min(x1), py, color);
            put(buffer, width, x1.saturating_sub(t).max(x0), py, color);
        }
    }
}

fn put(buffer: &mut [u32], width: usize, x: usize, y: usize, color: u32) {
    if let Some(px) = buffer.get_mut(y * width + x) {
        *px = color;
    }
}
