//! Reference ASCII point-cloud reader
//!
//! Reads `.pts` sources: one `x y z` triple per line, `#` starts a comment.
//! Deliberately minimal; it exists as the registry's built-in reference
//! plugin and as the format the pager tests load through.

use std::sync::Arc;

use crate::foundation::math::Vec3;
use crate::graph::{Drawable, PrimitiveMode};

use super::{NodePrototype, ReadError, ReadOptions, ReadOutcome, SceneReader};

/// Reader for whitespace-separated ASCII point clouds
pub struct PointCloudReader;

impl SceneReader for PointCloudReader {
    fn name(&self) -> &str {
        "point-cloud"
    }

    fn supports_extension(&self, extension: &str) -> bool {
        extension == "pts"
    }

    fn try_read(&self, bytes: &[u8], _options: &ReadOptions) -> Result<ReadOutcome, ReadError> {
        let Ok(text) = std::str::from_utf8(bytes) else {
            // binary data is some other format's problem
            return Ok(ReadOutcome::NotHandled);
        };

        let mut points = Vec::new();
        for (line_number, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(ReadError::Malformed {
                    reason: format!(
                        "line {}: expected 3 coordinates, got {}",
                        line_number + 1,
                        fields.len()
                    ),
                });
            }
            let mut coords = [0.0_f32; 3];
            for (slot, field) in coords.iter_mut().zip(&fields) {
                *slot = field.parse().map_err(|_| ReadError::Malformed {
                    reason: format!("line {}: invalid number \"{field}\"", line_number + 1),
                })?;
            }
            points.push(Vec3::new(coords[0], coords[1], coords[2]));
        }

        let drawable = Arc::new(Drawable::new(PrimitiveMode::Points, points).named("points"));
        Ok(ReadOutcome::Node(NodePrototype::geode(vec![drawable])))
    }
}
