// Differential drive kinematics for a two-wheel base
// Converts between wheel angles and body distance/heading.

use std::f32::consts::PI;

/// Geometry of a two-wheel differential drive (mm)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub wheel_diameter: f32,
    pub axle_track: f32,
}

/// Wheel angles or speeds for the two drive motors
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelPair {
    pub left: f32,
    pub right: f32,
}

impl WheelPair {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Average of both wheels, the part that moves the base forward
    pub fn sum(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    /// Half difference of both wheels, the part that turns the base
    pub fn dif(&self) -> f32 {
        (self.left - self.right) / 2.0
    }

    /// Recombine forward and turning parts into left/right values
    pub fn from_sum_dif(sum: f32, dif: f32) -> Self {
        Self {
            left: sum + dif,
            right: sum - dif,
        }
    }
}

impl Geometry {
    pub fn new(wheel_diameter: f32, axle_track: f32) -> Self {
        Self {
            wheel_diameter,
            axle_track,
        }
    }

    /// Wheel degrees per millimeter of travel
    pub fn wheel_deg_per_mm(&self) -> f32 {
        360.0 / (PI * self.wheel_diameter)
    }

    /// Wheel degrees (of the half difference) per degree of heading
    pub fn wheel_deg_per_heading_deg(&self) -> f32 {
        self.axle_track / self.wheel_diameter
    }

    /// Distance (mm) and heading (deg, clockwise positive) for wheel angles
    pub fn wheels_to_body(&self, wheels: WheelPair) -> (f32, f32) {
        (
            wheels.sum() / self.wheel_deg_per_mm(),
            wheels.dif() / self.wheel_deg_per_heading_deg(),
        )
    }

    /// Wheel angles needed for a distance (mm) and heading (deg)
    pub fn body_to_wheels(&self, distance: f32, heading: f32) -> WheelPair {
        WheelPair::from_sum_dif(
            distance * self.wheel_deg_per_mm(),
            heading * self.wheel_deg_per_heading_deg(),
        )
    }
}
