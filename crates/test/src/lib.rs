//! Integration tests for chaosbed live under `tests/`.
