/// Identifier of a shared resource stock.
pub type ResourceId = String;

/// Identifier of a production unit.
pub type UnitId = String;
