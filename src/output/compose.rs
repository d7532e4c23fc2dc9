//! 画面合成 (Frame composer)
//!
//! 画布 2W × (H + 面板): 左图在左, 右图在右, 面板在下.

use std::fs;

use ab_glyph::{FontVec, PxScale};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use tracing::info;

use super::OutputConfig;
use crate::detection::BBox;
use crate::error::{Result, SentinelError};
use crate::geofence::Severity;
use crate::input::Frame;
use crate::pipeline::{PersonReport, StepReport};
use crate::stereo::RangeBand;

const PANEL_BG: Rgb<u8> = Rgb([30, 30, 30]);
const ALARM_RED: Rgb<u8> = Rgb([255, 0, 0]);
const WARNING_BLUE: Rgb<u8> = Rgb([0, 120, 255]);
const NEAR_YELLOW: Rgb<u8> = Rgb([255, 200, 0]);
const FAR_GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// 画面合成器
pub struct FrameComposer {
    panel_height: u32,
    font: Option<FontVec>,
}

impl FrameComposer {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = fs::read(path)?;
                let font = FontVec::try_from_vec(bytes)
                    .map_err(|e| SentinelError::Config(format!("字体 {} 无效: {}", path, e)))?;
                info!("✅ 已加载字体: {}", path);
                Some(font)
            }
            None => None,
        };
        Ok(Self {
            panel_height: config.panel_height,
            font,
        })
    }

    /// 无字体, 只画图形
    pub fn without_text(panel_height: u32) -> Self {
        Self {
            panel_height,
            font: None,
        }
    }

    pub fn canvas_size(&self, frame_width: u32, frame_height: u32) -> (u32, u32) {
        (frame_width * 2, frame_height + self.panel_height)
    }

    pub fn compose(&self, left: &Frame, right: &Frame, report: &StepReport) -> RgbImage {
        let (w, h) = (left.width(), left.height());
        let (cw, ch) = self.canvas_size(w, h);
        let mut canvas = RgbImage::from_pixel(cw, ch, PANEL_BG);

        imageops::replace(&mut canvas, &*left.image, 0, 0);
        imageops::replace(&mut canvas, &*right.image, w as i64, 0);

        for person in &report.persons {
            let color = person_color(person);
            draw_person(&mut canvas, &person.left, 0, color);
            draw_person(&mut canvas, &person.right, w as i32, color);
            self.draw_label(&mut canvas, person, color);
        }

        self.draw_panel(&mut canvas, report, h);
        canvas
    }

    fn draw_label(&self, canvas: &mut RgbImage, person: &PersonReport, color: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let mut label = format!("ID {}", person.track_id);
        if let Some(d) = person.distance_ft {
            label.push_str(&format!(" {:.1}ft", d));
        }
        if let Some(zone) = &person.zone {
            label.push_str(&format!(" [{}]", zone));
        }
        let x = person.left.x1.max(0.0) as i32;
        let y = (person.left.y1 - 18.0).max(0.0) as i32;
        draw_text_mut(canvas, color, x, y, PxScale::from(16.0), font, &label);
    }

    fn draw_panel(&self, canvas: &mut RgbImage, report: &StepReport, top: u32) {
        if self.panel_height == 0 {
            return;
        }
        let width = canvas.width();
        if report.intrusion {
            // 无字体时也能看出告警
            draw_filled_rect_mut(
                canvas,
                Rect::at(0, top as i32).of_size(width, 6.min(self.panel_height)),
                ALARM_RED,
            );
        }

        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(20.0);
        let mut y = top as i32 + 12;
        if report.intrusion {
            draw_text_mut(canvas, ALARM_RED, 12, y, PxScale::from(28.0), font, "Intrusion Detected!");
            y += 36;
        }
        for person in &report.persons {
            if y + 20 > canvas.height() as i32 {
                break;
            }
            let distance = person
                .distance_ft
                .map_or_else(|| "--".to_string(), |d| format!("{:.1} ft", d));
            let disparity = person
                .smoothed_disparity
                .map_or_else(|| "--".to_string(), |d| format!("{:.1}px", d));
            let line = format!(
                "ID {:<4} distance {:<10} disparity {:>8}  {}",
                person.track_id,
                distance,
                disparity,
                person.zone.as_deref().unwrap_or("-"),
            );
            draw_text_mut(canvas, person_color(person), 12, y, scale, font, &line);
            y += 24;
        }
        let footer = format!("step {}  t={:.2}s", report.step, report.timestamp_secs);
        let footer_y = canvas.height() as i32 - 24;
        if footer_y > y {
            draw_text_mut(canvas, TEXT_WHITE, 12, footer_y, scale, font, &footer);
        }
    }
}

/// 告警区域优先, 其次按远近着色, 未测距用轨迹颜色
fn person_color(person: &PersonReport) -> Rgb<u8> {
    match (person.severity, person.band) {
        (Some(Severity::Alarm), _) => ALARM_RED,
        (Some(Severity::Warning), _) => WARNING_BLUE,
        (None, Some(RangeBand::Near)) => NEAR_YELLOW,
        (None, Some(RangeBand::Far)) => FAR_GREEN,
        (None, None) => {
            let (r, g, b) = person.color;
            Rgb([r, g, b])
        }
    }
}

/// 检测框 (2像素宽) + 中心点
fn draw_person(canvas: &mut RgbImage, bbox: &BBox, offset_x: i32, color: Rgb<u8>) {
    let x = bbox.x1 as i32 + offset_x;
    let y = bbox.y1 as i32;
    let w = bbox.width().max(1.0) as u32;
    let h = bbox.height().max(1.0) as u32;
    for t in 0..2 {
        let rect = Rect::at(x - t, y - t).of_size(w + 2 * t as u32, h + 2 * t as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
    let (cx, cy) = bbox.center();
    draw_filled_circle_mut(canvas, (cx as i32 + offset_x, cy as i32), 4, color);
}
