//! Trained record-linkage scoring: comparison vectors, a logistic model fitted on
//! automatically labelled pairs, an F-beta threshold and transitive clustering.

pub mod clustering;
pub mod features;
pub mod model;
pub mod scorer;
pub mod training;
