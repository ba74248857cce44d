//! Conservative start-depth rasterization for particle sets.
//!
//! Every particle's support box is projected to the screen; the covered pixels
//! take the smallest NDC depth of the box corners. Any ray that can reach a
//! particle's support therefore starts in front of it. Pixels covered by nothing
//! keep `BACKGROUND_DEPTH`.

use nalgebra::Vector3;

use crate::core::{FrameCamera, BACKGROUND_DEPTH};

pub fn rasterize_particle_depth(camera: &FrameCamera, positions: &[Vector3<f32>], radius: f32) -> Vec<f32> {
    let mut depth = vec![BACKGROUND_DEPTH; camera.pixel_count()];
    let (w, h) = (camera.width as f32, camera.height as f32);

    for p in positions {
        let mut min = Vector3::repeat(f32::INFINITY);
        let mut max = Vector3::repeat(f32::NEG_INFINITY);
        let mut behind = false;

        for corner in 0..8 {
            let sign = |bit: usize| if corner & bit == 0 { -radius } else { radius };
            let c = p + Vector3::new(sign(1), sign(2), sign(4));
            match camera.project(&c) {
                Some(s) => {
                    min = min.inf(&s);
                    max = max.sup(&s);
                }
                None => behind = true,
            }
        }

        // Box straddles the camera plane: fall back to the whole screen from the near plane.
        let (x0, x1, y0, y1, d) = if behind {
            (0.0, w, 0.0, h, 0.0)
        } else {
            (min.x, max.x, min.y, max.y, min.z.max(0.0))
        };
        if x1 < 0.0 || y1 < 0.0 || x0 >= w || y0 >= h || d >= BACKGROUND_DEPTH {
            continue;
        }

        let xs = x0.max(0.0).floor() as u32..(x1.ceil().min(w) as u32);
        let ys = y0.max(0.0).floor() as u32..(y1.ceil().min(h) as u32);
        for y in ys {
            for x in xs.clone() {
                let i = (y * camera.width + x) as usize;
                if d < depth[i] {
                    depth[i] = d;
                }
            }
        }
    }
    depth
}
