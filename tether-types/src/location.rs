//! Location samples.

use crate::error::Status;
use serde::{Deserialize, Serialize};

/// How a location fix was obtained.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// Source not reported.
    Unknown,
    /// Statically configured position.
    Fixed,
    /// Satellite positioning.
    Gps,
    /// Wireless network triangulation.
    Wifi,
}

/// A geographic position with optional quality fields.
///
/// Latitude and longitude are mandatory and range-checked at construction;
/// every other field is optional and set through a checked setter. The
/// optional fields replace the presence bitmask the wire format uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    altitude: Option<f64>,
    altitude_accuracy: Option<f64>,
    heading: Option<f64>,
    speed: Option<f64>,
    source: Option<LocationSource>,
}

impl Location {
    /// Create a location at the given coordinates, in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`Status::BadParameter`] when the latitude is outside
    /// ±90° or the longitude is outside ±180°.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, Status> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(Status::BadParameter);
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
            source: None,
        })
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Horizontal accuracy in meters, if reported.
    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    /// Altitude in meters, if reported.
    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    /// Vertical accuracy in meters, if reported.
    pub fn altitude_accuracy(&self) -> Option<f64> {
        self.altitude_accuracy
    }

    /// Heading in degrees clockwise from north, if reported.
    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    /// Ground speed in meters per second, if reported.
    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    /// Fix source, if reported.
    pub fn source(&self) -> Option<LocationSource> {
        self.source
    }

    /// Set the horizontal accuracy in meters.
    pub fn set_accuracy(&mut self, meters: f64) {
        self.accuracy = Some(meters);
    }

    /// Set the altitude in meters.
    pub fn set_altitude(&mut self, meters: f64) {
        self.altitude = Some(meters);
    }

    /// Set the vertical accuracy in meters.
    pub fn set_altitude_accuracy(&mut self, meters: f64) {
        self.altitude_accuracy = Some(meters);
    }

    /// Set the heading in degrees clockwise from north.
    ///
    /// # Errors
    ///
    /// Returns [`Status::BadParameter`] outside `0..=360`.
    pub fn set_heading(&mut self, degrees: f64) -> Result<(), Status> {
        if !(0.0..=360.0).contains(&degrees) {
            return Err(Status::BadParameter);
        }
        self.heading = Some(degrees);
        Ok(())
    }

    /// Set the ground speed in meters per second.
    pub fn set_speed(&mut self, meters_per_second: f64) {
        self.speed = Some(meters_per_second);
    }

    /// Set the fix source.
    pub fn set_source(&mut self, source: LocationSource) {
        self.source = Some(source);
    }
}
