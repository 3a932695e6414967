mod body_force;
mod driver;
