pub mod copy_move;
pub mod ela;
pub mod noise;
