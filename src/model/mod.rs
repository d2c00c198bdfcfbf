mod config;
mod encoder;
mod io;
mod loss;
mod params;
mod recurrent;
mod seq2seq;
mod state;

pub use config::{DEFAULT_MAX_EPS, DEFAULT_MAX_LM_POS_WEIGHTS, ModelVariant, Seq2SeqConfig};
pub use encoder::{BiEncoder, Encoding};
pub use io::{CONFIG_FILE, PARAMS_FILE, read_config};
pub use loss::{epsilon_index, fuse_with_lm, gate_index, softplus, softplus_tensor};
pub use params::{ParamSet, Seq2SeqParams};
pub use recurrent::{LstmCell, StackedLstm};
pub use seq2seq::{MorphSeq2Seq, scalar_value};
pub use state::{CellState, DecoderSession, RecurrentState};
