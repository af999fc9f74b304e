//! Plugin registries (§4.1, §5, §6 `-V`): one [`Registry`] per stage kind,
//! pre-populated with every concrete plugin this binary ships. The CLI
//! builds one [`Registries`] at startup and hands it to the config loader,
//! which looks plugins up by the name given in each INI stage section.

use pipeline_core::Registry;

use crate::decoder::Decoder;
use crate::demuxer::Demuxer;
use crate::encoder::Encoder;
use crate::filter::Filter;
use crate::input::Input;

/// Every plugin registry the pipeline needs to resolve a `[source.*]` or
/// `[destination.*]` section into live stage objects.
pub struct Registries {
    pub inputs: Registry<Box<dyn Input>>,
    pub demuxers: Registry<Box<dyn Demuxer>>,
    pub decoders: Registry<Box<dyn Decoder>>,
    pub filters: Registry<Box<dyn Filter>>,
    pub encoders: Registry<Box<dyn Encoder>>,
    pub muxers: Registry<Box<dyn muxers::Muxer>>,
    pub outputs: Registry<Box<dyn outputs::Output>>,
}

impl Registries {
    pub fn build() -> Self {
        let mut inputs: Registry<Box<dyn Input>> = Registry::new("input");
        inputs.register("file", || Box::new(crate::input::FileInput::new()));
        inputs.register("stdin", || Box::new(crate::input::StdinInput::new()));
        inputs.register("network", || Box::new(crate::input::NetworkInput::new()));

        let mut demuxers: Registry<Box<dyn Demuxer>> = Registry::new("demuxer");
        demuxers.register("auto", || Box::new(crate::demuxer::AutoDemuxer::new()));
        demuxers.register("flac", || Box::new(crate::demuxer::FlacDemuxer::new()));
        demuxers.register("generic", || Box::new(crate::demuxer::GenericDemuxer::new()));
        demuxers.register("ogg", || Box::new(crate::demuxer::OggDemuxer::new()));

        let mut decoders: Registry<Box<dyn Decoder>> = Registry::new("decoder");
        decoders.register("auto", || Box::new(crate::decoder::AutoDecoder::new()));
        decoders.register("passthrough", || Box::new(crate::decoder::PassthroughDecoder::new()));
        decoders.register("pcm", || Box::new(crate::decoder::PcmDecoder::new()));

        let mut filters: Registry<Box<dyn Filter>> = Registry::new("filter");
        filters.register("buffer", || Box::new(crate::filter::BufferFilter::new()));
        filters.register("convert", || Box::new(crate::filter::ConvertFilter::new()));
        filters.register("passthrough", || Box::new(crate::filter::PassthroughFilter::new()));

        let mut encoders: Registry<Box<dyn Encoder>> = Registry::new("encoder");
        encoders.register("passthrough", || Box::new(crate::encoder::PassthroughEncoder::new()));
        encoders.register("pcm", || Box::new(crate::encoder::PcmEncoder::new()));

        let mut muxer_registry: Registry<Box<dyn muxers::Muxer>> = Registry::new("muxer");
        muxer_registry.register("adts", || Box::new(muxers::adts::AdtsMuxer::new()));
        muxer_registry.register("fmp4", || Box::new(muxers::fmp4::Fmp4Muxer::new()));
        muxer_registry.register("ogg", || Box::new(muxers::ogg::OggMuxer::new()));
        muxer_registry.register("packed", || Box::new(muxers::packed::PackedMuxer::new()));

        let mut output_registry: Registry<Box<dyn outputs::Output>> = Registry::new("output");
        output_registry.register("folder", || Box::new(outputs::FolderOutput::create()));
        output_registry.register("http", || Box::new(outputs::HttpOutput::create()));
        output_registry.register("s3", || Box::new(outputs::S3Output::create()));
        output_registry.register("icecast", || Box::new(outputs::IcecastOutput::new(Default::default())));
        output_registry.register("stdout", || Box::new(outputs::StdoutOutput::new()));

        Self {
            inputs,
            demuxers,
            decoders,
            filters,
            encoders,
            muxers: muxer_registry,
            outputs: output_registry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_plugin_name_is_registered() {
        let reg = Registries::build();
        assert_eq!(reg.inputs.names().collect::<Vec<_>>(), vec!["file", "network", "stdin"]);
        assert_eq!(reg.demuxers.names().collect::<Vec<_>>(), vec!["auto", "flac", "generic", "ogg"]);
        assert_eq!(reg.decoders.names().collect::<Vec<_>>(), vec!["auto", "passthrough", "pcm"]);
        assert_eq!(reg.filters.names().collect::<Vec<_>>(), vec!["buffer", "convert", "passthrough"]);
        assert_eq!(reg.encoders.names().collect::<Vec<_>>(), vec!["passthrough", "pcm"]);
        assert_eq!(reg.muxers.names().collect::<Vec<_>>(), vec!["adts", "fmp4", "ogg", "packed"]);
        assert_eq!(
            reg.outputs.names().collect::<Vec<_>>(),
            vec!["folder", "http", "icecast", "s3", "stdout"]
        );
    }

    #[test]
    fn create_builds_a_usable_plugin() {
        let reg = Registries::build();
        let decoder = reg.decoders.create("pcm").expect("pcm decoder registered");
        assert_eq!(decoder.name(), "pcm");
    }
}
