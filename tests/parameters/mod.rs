// Tests for the parameter vector: layout, scaling and constraints
