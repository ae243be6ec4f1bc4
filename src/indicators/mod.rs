// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator math. Insufficient data is reported as an
// empty series or `None`, never as an error.

pub mod rsi;
