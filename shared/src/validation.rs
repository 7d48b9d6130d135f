//! Validation utilities for the Field Lifecycle Management Service

use rust_decimal::Decimal;

// ============================================================================
// Vegetation Index Validations
// ============================================================================

/// Validate a normalized-difference index (NDVI/NDRE) is in [-1, 1]
pub fn validate_index_value(value: f64) -> Result<(), &'static str> {
    if !(-1.0..=1.0).contains(&value) {
        return Err("Vegetation index must be between -1 and 1");
    }
    Ok(())
}

// ============================================================================
// Field Input Validations
// ============================================================================

/// Validate a field name (non-empty, at most 100 characters)
pub fn validate_field_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Field name cannot be empty");
    }
    if trimmed.len() > 100 {
        return Err("Field name must be at most 100 characters");
    }
    Ok(())
}

/// Validate a crop type label (non-empty, at most 100 characters)
pub fn validate_crop_type(crop_type: &str) -> Result<(), &'static str> {
    let trimmed = crop_type.trim();
    if trimmed.is_empty() {
        return Err("Crop type cannot be empty");
    }
    if trimmed.len() > 100 {
        return Err("Crop type must be at most 100 characters");
    }
    Ok(())
}

/// Validate a field area in hectares is positive and plausible
pub fn validate_area_hectares(area: Decimal) -> Result<(), &'static str> {
    if area <= Decimal::ZERO {
        return Err("Field area must be positive");
    }
    if area > Decimal::from(100_000) {
        return Err("Field area is implausibly large");
    }
    Ok(())
}

/// Validate GPS coordinates are on the globe
pub fn validate_coordinates(latitude: Decimal, longitude: Decimal) -> Result<(), &'static str> {
    if latitude < Decimal::from(-90) || latitude > Decimal::from(90) {
        return Err("Latitude must be between -90 and 90");
    }
    if longitude < Decimal::from(-180) || longitude > Decimal::from(180) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_index_value_range() {
        assert!(validate_index_value(0.0).is_ok());
        assert!(validate_index_value(1.0).is_ok());
        assert!(validate_index_value(-1.0).is_ok());
        assert!(validate_index_value(1.01).is_err());
        assert!(validate_index_value(-1.01).is_err());
    }

    #[test]
    fn test_validate_index_value_rejects_nan() {
        assert!(validate_index_value(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_field_name() {
        assert!(validate_field_name("North Paddock").is_ok());
        assert!(validate_field_name("").is_err());
        assert!(validate_field_name("   ").is_err());
        assert!(validate_field_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_crop_type() {
        assert!(validate_crop_type("winter wheat").is_ok());
        assert!(validate_crop_type("").is_err());
        assert!(validate_crop_type(&"c".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_area_hectares() {
        assert!(validate_area_hectares(Decimal::new(125, 1)).is_ok());
        assert!(validate_area_hectares(Decimal::ZERO).is_err());
        assert!(validate_area_hectares(Decimal::from(-3)).is_err());
        assert!(validate_area_hectares(Decimal::from(200_000)).is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(Decimal::new(4851, 2), Decimal::new(235, 2)).is_ok());
        assert!(validate_coordinates(Decimal::from(91), Decimal::ZERO).is_err());
        assert!(validate_coordinates(Decimal::ZERO, Decimal::from(-181)).is_err());
    }
}
