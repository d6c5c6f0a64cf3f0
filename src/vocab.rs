// Closed crop and soil vocabularies used by training and inference.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Crop types the system knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crop { Wheat, Rice, Corn, Soybean, Barley, Potato }

impl Crop {
    pub const ALL: [Crop; 6] = [
        Crop::Wheat,
        Crop::Rice,
        Crop::Corn,
        Crop::Soybean,
        Crop::Barley,
        Crop::Potato,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Crop::Wheat => "Wheat",
            Crop::Rice => "Rice",
            Crop::Corn => "Corn",
            Crop::Soybean => "Soybean",
            Crop::Barley => "Barley",
            Crop::Potato => "Potato",
        }
    }

    /// Base yield in tons/hectare before soil and weather effects.
    pub fn base_yield(self) -> f64 {
        match self {
            Crop::Wheat => 4.5,
            Crop::Rice => 5.0,
            Crop::Corn => 6.5,
            Crop::Soybean => 3.0,
            Crop::Barley => 4.0,
            Crop::Potato => 25.0,
        }
    }
}

impl FromStr for Crop {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Crop::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown crop: {}", s))
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Soil types the system knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Soil { Loamy, Clay, Sandy, Silty }

impl Soil {
    pub const ALL: [Soil; 4] = [Soil::Loamy, Soil::Clay, Soil::Sandy, Soil::Silty];

    pub fn as_str(self) -> &'static str {
        match self {
            Soil::Loamy => "Loamy",
            Soil::Clay => "Clay",
            Soil::Sandy => "Sandy",
            Soil::Silty => "Silty",
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Soil::Loamy => 1.2,
            Soil::Clay => 1.0,
            Soil::Sandy => 0.8,
            Soil::Silty => 1.1,
        }
    }
}

impl FromStr for Soil {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Soil::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown soil: {}", s))
    }
}

impl fmt::Display for Soil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crop names in their canonical listing order.
pub fn crop_names() -> Vec<&'static str> {
    Crop::ALL.iter().map(|c| c.as_str()).collect()
}

/// Soil names in their canonical listing order.
pub fn soil_names() -> Vec<&'static str> {
    Soil::ALL.iter().map(|s| s.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_listed_name() {
        for name in crop_names() {
            assert_eq!(name.parse::<Crop>().unwrap().as_str(), name);
        }
        for name in soil_names() {
            assert_eq!(name.parse::<Soil>().unwrap().as_str(), name);
        }
    }

    #[test]
    fn rejects_unknown_and_wrong_case() {
        assert!("Tomato".parse::<Crop>().is_err());
        assert!("wheat".parse::<Crop>().is_err());
        assert!("Peat".parse::<Soil>().is_err());
    }

    #[test]
    fn potato_dominates_base_yield() {
        let max = Crop::ALL.iter().copied().max_by(|a, b| a.base_yield().total_cmp(&b.base_yield()));
        assert_eq!(max, Some(Crop::Potato));
    }
}
