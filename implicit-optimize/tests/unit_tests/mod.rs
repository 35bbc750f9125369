mod calculus;
mod newton;
mod normalisation;
mod tangent;
