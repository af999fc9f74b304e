//! Config -> live pipeline (§4.11/§4.12, §6): resolves every `[source.*]`/
//! `[destination.*]` section against the plugin [`stages::registries::Registries`],
//! applies stage defaults, builds the `rendezvous` pair linking each
//! destination back to its source, and returns ready-to-spawn
//! [`stages::Source`]/[`stages::Destination`] instances plus their
//! [`rendezvous::Consumer`] halves.
//!
//! Default plugin substitution (§4.11/§4.12): `demuxer`/`decoder` default
//! to `"auto"`, the source-side `filter` defaults to `"passthrough"`, the
//! destination-side `filter` defaults to `"buffer"` and `muxer` defaults
//! to `"fmp4"`. The original's encoder default is the external `exhale`
//! FLAC encoder; since real codec bindings are out of scope here (§1,
//! `SPEC_FULL.md` §11), the shipped `pcm` codec stands in as the default
//! — recorded in `DESIGN.md`.

use std::collections::HashMap;

use icecast_hls_config::{ProgramConfig, SourceConfig, StageConfig, TagMapSelector};
use rendezvous::{Consumer, Producer};
use stages::destination::TagPolicy;
use stages::registries::Registries;
use stages::{Destination, Source};
use tagmodel::TagMapEntry;
use timeutil::IchTime;

use crate::error::IcecastHlsError;

/// Every live `Destination` plus the `Consumer` half of its rendezvous,
/// ready to be handed to a `DestinationList`.
pub struct WiredDestination {
    pub destination: Destination,
    pub consumer: Consumer,
}

/// The fully wired pipeline: one `Source` per `[source.*]` section
/// (already holding the `Producer` half of every destination that
/// references it) plus every `WiredDestination`.
pub struct WiredPipeline {
    pub sources: Vec<Source>,
    pub destinations: Vec<WiredDestination>,
    /// One [`rendezvous::QuitHandle`] per destination, flat across every
    /// source, independent of which `Source` owns the matching `Producer`
    /// (§5 shortflag: "marks every destination's status non-zero", not
    /// just the erroring source's own). `icecast-hls-cli`'s run loop uses
    /// this to escalate a fatal source error to every other source's
    /// destinations when `stop-on-source-ending = true`.
    pub quit_handles: Vec<rendezvous::QuitHandle>,
}

fn apply_settings(
    section: &'static str,
    id: &str,
    stage: &mut dyn FnMut(&str, &str) -> pipeline_core::StageResult,
    settings: &[(String, String)],
) -> Result<(), IcecastHlsError> {
    for (key, value) in settings {
        stage(key, value)
            .map_err(|source| IcecastHlsError::Stage { section, id: id.to_string(), source })?;
    }
    Ok(())
}

fn build_source(registries: &Registries, cfg: &SourceConfig) -> Result<Source, IcecastHlsError> {
    let input_name = cfg.input.plugin_or("file");
    let mut input = registries.inputs.create(input_name).ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "source",
        id: cfg.id.clone(),
        kind: "input",
        name: input_name.to_string(),
    })?;
    apply_settings("source", &cfg.id, &mut |k, v| input.config(k, v), &cfg.input.settings)?;

    let demuxer_name = cfg.demuxer.plugin_or("auto");
    let mut demuxer = registries.demuxers.create(demuxer_name).ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "source",
        id: cfg.id.clone(),
        kind: "demuxer",
        name: demuxer_name.to_string(),
    })?;
    apply_settings("source", &cfg.id, &mut |k, v| demuxer.config(k, v), &cfg.demuxer.settings)?;

    let decoder_name = cfg.decoder.plugin_or("auto");
    let mut decoder = registries.decoders.create(decoder_name).ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "source",
        id: cfg.id.clone(),
        kind: "decoder",
        name: decoder_name.to_string(),
    })?;
    apply_settings("source", &cfg.id, &mut |k, v| decoder.config(k, v), &cfg.decoder.settings)?;

    let filter_name = cfg.filter.plugin_or("passthrough");
    let mut filter = registries.filters.create(filter_name).ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "source",
        id: cfg.id.clone(),
        kind: "filter",
        name: filter_name.to_string(),
    })?;
    apply_settings("source", &cfg.id, &mut |k, v| filter.config(k, v), &cfg.filter.settings)?;

    Ok(Source::new(cfg.id.clone(), input, demuxer, decoder, filter, Vec::new()))
}

fn build_tag_policy(config: &ProgramConfig, dest: &icecast_hls_config::DestinationConfig) -> TagPolicy {
    let tagmap = match &dest.tagmap {
        TagMapSelector::Disabled => None,
        TagMapSelector::Named(id) => config.tagmap(id).map(|tm| {
            let mut entry = TagMapEntry::new(tm.id.clone());
            for rule in &tm.rules {
                entry.add_rule(rule.source_key.as_bytes(), rule.dest_id.as_bytes().to_vec(), rule.priority);
            }
            entry
        }),
    };
    TagPolicy {
        tagmap,
        merge: dest.duplicate_tags,
        unknown: dest.unknown_tags,
    }
}

fn image_mode(cfg: icecast_hls_config::ImageModeConfig) -> pipeline_core::ImageMode {
    use icecast_hls_config::ImageModeConfig as C;
    match cfg {
        C::Keep => pipeline_core::ImageMode::Keep,
        C::Inband => pipeline_core::ImageMode::Inband,
        C::OutOfBand => pipeline_core::ImageMode::OutOfBand,
        C::Remove => pipeline_core::ImageMode::Remove,
    }
}

fn apply_stage_settings_generic<T: ?Sized>(
    section: &'static str,
    id: &str,
    stage: &mut T,
    settings: &[(String, String)],
    config_fn: impl Fn(&mut T, &str, &str) -> pipeline_core::StageResult,
) -> Result<(), IcecastHlsError> {
    for (key, value) in settings {
        config_fn(stage, key, value).map_err(|source| IcecastHlsError::Stage { section, id: id.to_string(), source })?;
    }
    Ok(())
}

fn build_destination(
    registries: &Registries,
    config: &ProgramConfig,
    dest: &icecast_hls_config::DestinationConfig,
) -> Result<Destination, IcecastHlsError> {
    let filter_name = dest.filter.plugin_or("buffer");
    let mut filter = registries.filters.create(filter_name).ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "destination",
        id: dest.id.clone(),
        kind: "filter",
        name: filter_name.to_string(),
    })?;
    apply_stage_settings_generic("destination", &dest.id, filter.as_mut(), &dest.filter.settings, |s, k, v| {
        s.config(k, v)
    })?;

    let encoder_name = dest.encoder.plugin_or("pcm");
    let mut encoder = registries.encoders.create(encoder_name).ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "destination",
        id: dest.id.clone(),
        kind: "encoder",
        name: encoder_name.to_string(),
    })?;
    apply_stage_settings_generic("destination", &dest.id, encoder.as_mut(), &dest.encoder.settings, |s, k, v| {
        s.config(k, v)
    })?;

    let muxer_name = dest.muxer.plugin_or("fmp4");
    let mut muxer = registries.muxers.create(muxer_name).ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "destination",
        id: dest.id.clone(),
        kind: "muxer",
        name: muxer_name.to_string(),
    })?;
    muxer.config("image-mode", image_mode_key(dest.images)).map_err(|source| IcecastHlsError::Stage {
        section: "destination",
        id: dest.id.clone(),
        source,
    })?;
    apply_stage_settings_generic("destination", &dest.id, muxer.as_mut(), &dest.muxer.settings, |s, k, v| {
        s.config(k, v)
    })?;

    let output_name = dest.output.plugin.as_deref().ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "destination",
        id: dest.id.clone(),
        kind: "output",
        name: "<none>".to_string(),
    })?;
    let mut output = registries.outputs.create(output_name).ok_or_else(|| IcecastHlsError::UnknownPlugin {
        section: "destination",
        id: dest.id.clone(),
        kind: "output",
        name: output_name.to_string(),
    })?;
    apply_stage_settings_generic("destination", &dest.id, output.as_mut(), &dest.output.settings, |s, k, v| {
        s.config(k, v)
    })?;

    let tag_policy = build_tag_policy(config, dest);
    Ok(Destination::new(dest.id.clone(), filter, encoder, muxer, output, tag_policy, IchTime::now()))
}

fn image_mode_key(mode: icecast_hls_config::ImageModeConfig) -> &'static str {
    use icecast_hls_config::ImageModeConfig as C;
    match mode {
        C::Keep => "keep",
        C::Inband => "inband",
        C::OutOfBand => "out-of-band",
        C::Remove => "remove",
    }
}

/// Build every `Source`/`Destination`, linking each destination back to
/// its source through a fresh `rendezvous::pair()` (§4.12
/// "`source.open_dest(source_receiver)`").
pub fn wire(config: &ProgramConfig, registries: &Registries) -> Result<WiredPipeline, IcecastHlsError> {
    let mut producers_by_source: HashMap<String, Vec<Producer>> = HashMap::new();
    let mut quit_handles = Vec::with_capacity(config.destinations.len());
    let mut destinations = Vec::with_capacity(config.destinations.len());

    for dest_cfg in &config.destinations {
        let destination = build_destination(registries, config, dest_cfg)?;
        let (producer, consumer) = rendezvous::pair();
        quit_handles.push(producer.quit_handle());
        producers_by_source.entry(dest_cfg.source.clone()).or_default().push(producer);
        destinations.push(WiredDestination { destination, consumer });
    }

    let mut sources = Vec::with_capacity(config.sources.len());
    for source_cfg in &config.sources {
        let producers = producers_by_source.remove(&source_cfg.id).unwrap_or_default();
        let mut source = build_source(registries, source_cfg)?;
        source.attach_producers(producers);
        sources.push(source);
    }

    if sources.is_empty() {
        return Err(IcecastHlsError::NoSources);
    }

    Ok(WiredPipeline { sources, destinations, quit_handles })
}
