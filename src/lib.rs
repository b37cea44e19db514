//! Placeholder target for the workspace-level tooling package (pre-commit hooks).
