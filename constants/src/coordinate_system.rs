/// Row-major frame turning Z-up survey data into the Y-up space the viewer
/// renders in (-90° about X: X→X, Z→Y, -Y→Z).
pub const Z_UP_TO_Y_UP: [[f64; 3]; 3] = [
    [1.0, 0.0, 0.0],  // X = X
    [0.0, 0.0, 1.0],  // Y = Z
    [0.0, -1.0, 0.0], // Z = -Y
];

/// Multiply a point by a row-major 3x3 frame.
pub fn apply_frame(frame: &[[f64; 3]; 3], point: [f64; 3]) -> [f64; 3] {
    frame.map(|row| row[0] * point[0] + row[1] * point[1] + row[2] * point[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_up_maps_to_y_up() {
        assert_eq!(apply_frame(&Z_UP_TO_Y_UP, [0.0, 0.0, 5.0]), [0.0, 5.0, 0.0]);
        assert_eq!(apply_frame(&Z_UP_TO_Y_UP, [1.0, 2.0, 0.0]), [1.0, 0.0, -2.0]);
    }
}
