//! INI text -> [`ProgramConfig`] (§6). The `ini` crate is the external
//! collaborator that turns bytes into `(section, key, value)` triples
//! (spec.md §1 names the INI parser itself as out of scope); everything
//! below — stage-selector tracking, prefix routing, cross-section
//! validation — is the ambient config-model work `SPEC_FULL.md` §2 and
//! §4.1 place in scope.

use ini::{Ini, Properties};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    DestinationConfig, ImageModeConfig, LogLevel, Options, ProgramConfig, SourceConfig, StageConfig, TagMapConfig,
    TagMapRuleConfig, TagMapSelector,
};

pub fn parse_file(path: &str) -> ConfigResult<ProgramConfig> {
    let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Ini { path: path.to_string(), source })?;
    parse_ini(&ini)
}

pub fn parse_str(text: &str) -> ConfigResult<ProgramConfig> {
    let ini = Ini::load_from_str(text).map_err(|source| ConfigError::Ini { path: "<string>".to_string(), source })?;
    parse_ini(&ini)
}

fn parse_ini(ini: &Ini) -> ConfigResult<ProgramConfig> {
    let mut config = ProgramConfig::default();
    let mut seen_sections = std::collections::HashSet::new();

    for (header, props) in ini.iter() {
        let Some(header) = header else { continue };
        if !seen_sections.insert(header.to_string()) {
            return Err(ConfigError::DuplicateSection(header.to_string()));
        }

        if header == "options" {
            config.options = parse_options(props)?;
        } else if let Some(id) = header.strip_prefix("source.") {
            config.sources.push(parse_source(id, props)?);
        } else if let Some(id) = header.strip_prefix("destination.") {
            config.destinations.push(parse_destination(id, props)?);
        } else if let Some(id) = header.strip_prefix("tagmap.") {
            config.tagmaps.push(parse_tagmap(id, props));
        }
    }

    validate(&config)?;
    Ok(config)
}

fn parse_options(props: &Properties) -> ConfigResult<Options> {
    let mut options = Options::default();
    for (key, value) in props.iter() {
        let key: &str = key;
        let value: &str = value;
        match key {
            "stop-on-source-ending" => {
                options.stop_on_source_ending = parse_bool("options", key, value)?;
            }
            "log-level" => {
                options.log_level = LogLevel::parse(value).ok_or_else(|| ConfigError::InvalidValue {
                    section: "options".to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            _ => {
                return Err(ConfigError::InvalidValue {
                    section: "options".to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }
    Ok(options)
}

fn parse_bool(section: &str, key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Four pull-chain stage kinds a `[source.*]` section's keys route to.
#[derive(Clone, Copy, PartialEq, Eq)]
enum SourceStage {
    Input,
    Demuxer,
    Decoder,
    Filter,
}

fn parse_source(id: &str, props: &Properties) -> ConfigResult<SourceConfig> {
    let section = format!("source.{id}");
    let mut cfg = SourceConfig { id: id.to_string(), ..Default::default() };
    let mut active: Option<SourceStage> = None;

    for (key, value) in props.iter() {
        let key: &str = key;
        let value: &str = value;
        use SourceStage::*;
        let (stage, routed_key) = if key == "input" {
            cfg.input.plugin = Some(value.to_string());
            active = Some(Input);
            continue;
        } else if key == "demuxer" {
            cfg.demuxer.plugin = Some(value.to_string());
            active = Some(Demuxer);
            continue;
        } else if key == "decoder" {
            cfg.decoder.plugin = Some(value.to_string());
            active = Some(Decoder);
            continue;
        } else if key == "filter" {
            cfg.filter.plugin = Some(value.to_string());
            active = Some(Filter);
            continue;
        } else if let Some(rest) = key.strip_prefix("input-") {
            active = Some(Input);
            (Input, rest)
        } else if let Some(rest) = key.strip_prefix("demuxer-") {
            active = Some(Demuxer);
            (Demuxer, rest)
        } else if let Some(rest) = key.strip_prefix("decoder-") {
            active = Some(Decoder);
            (Decoder, rest)
        } else if let Some(rest) = key.strip_prefix("filter-") {
            active = Some(Filter);
            (Filter, rest)
        } else {
            let Some(stage) = active else {
                return Err(ConfigError::NoActiveStage { section, key: key.to_string() });
            };
            (stage, key)
        };

        let target = match stage {
            Input => &mut cfg.input,
            Demuxer => &mut cfg.demuxer,
            Decoder => &mut cfg.decoder,
            Filter => &mut cfg.filter,
        };
        target.settings.push((routed_key.to_string(), value.to_string()));
    }
    Ok(cfg)
}

/// Four push-chain stage kinds a `[destination.*]` section's keys route
/// to, after the destination's own top-level keys (`source`/`tagmap`/
/// `images`/`unknown-tags`/`duplicate-tags`) are stripped out.
#[derive(Clone, Copy, PartialEq, Eq)]
enum DestStage {
    Filter,
    Encoder,
    Muxer,
    Output,
}

fn parse_destination(id: &str, props: &Properties) -> ConfigResult<DestinationConfig> {
    let section = format!("destination.{id}");
    let mut source = None;
    let mut tagmap = TagMapSelector::Disabled;
    let mut images = ImageModeConfig::OutOfBand;
    let mut unknown_tags = tagmodel::UnknownTagPolicy::Ignore;
    let mut duplicate_tags = tagmodel::MergePolicy::Ignore;
    let mut filter = StageConfig::default();
    let mut encoder = StageConfig::default();
    let mut muxer = StageConfig::default();
    let mut output = StageConfig::default();
    let mut active: Option<DestStage> = None;

    for (key, value) in props.iter() {
        let key: &str = key;
        let value: &str = value;
        use DestStage::*;
        match key {
            "source" => {
                source = Some(value.to_string());
                continue;
            }
            "tagmap" => {
                tagmap = if value.eq_ignore_ascii_case("disable") {
                    TagMapSelector::Disabled
                } else {
                    TagMapSelector::Named(value.to_string())
                };
                continue;
            }
            "images" => {
                images = ImageModeConfig::parse(value).ok_or_else(|| ConfigError::InvalidValue {
                    section: section.clone(),
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
                continue;
            }
            "unknown-tags" => {
                unknown_tags =
                    tagmodel::UnknownTagPolicy::parse(value).ok_or_else(|| ConfigError::InvalidValue {
                        section: section.clone(),
                        key: key.to_string(),
                        value: value.to_string(),
                    })?;
                continue;
            }
            "duplicate-tags" => {
                duplicate_tags = tagmodel::MergePolicy::parse(value).ok_or_else(|| ConfigError::InvalidValue {
                    section: section.clone(),
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
                continue;
            }
            "filter" => {
                filter.plugin = Some(value.to_string());
                active = Some(Filter);
                continue;
            }
            "encoder" => {
                encoder.plugin = Some(value.to_string());
                active = Some(Encoder);
                continue;
            }
            "muxer" => {
                muxer.plugin = Some(value.to_string());
                active = Some(Muxer);
                continue;
            }
            "output" => {
                output.plugin = Some(value.to_string());
                active = Some(Output);
                continue;
            }
            _ => {}
        }

        let (stage, routed_key) = if let Some(rest) = key.strip_prefix("filter-") {
            active = Some(Filter);
            (Filter, rest)
        } else if let Some(rest) = key.strip_prefix("encoder-") {
            active = Some(Encoder);
            (Encoder, rest)
        } else if let Some(rest) = key.strip_prefix("muxer-") {
            active = Some(Muxer);
            (Muxer, rest)
        } else if let Some(rest) = key.strip_prefix("output-") {
            active = Some(Output);
            (Output, rest)
        } else {
            let Some(stage) = active else {
                return Err(ConfigError::NoActiveStage { section, key: key.to_string() });
            };
            (stage, key)
        };

        let target = match stage {
            Filter => &mut filter,
            Encoder => &mut encoder,
            Muxer => &mut muxer,
            Output => &mut output,
        };
        target.settings.push((routed_key.to_string(), value.to_string()));
    }

    let source = source.ok_or_else(|| ConfigError::MissingKey { section: section.clone(), key: "source".into() })?;

    Ok(DestinationConfig {
        id: id.to_string(),
        source,
        tagmap,
        images,
        unknown_tags,
        duplicate_tags,
        filter,
        encoder,
        muxer,
        output,
    })
}

/// `<source-key> = <4-char-id3-name> [priority=<u8>]` (§6).
fn parse_tagmap(id: &str, props: &Properties) -> TagMapConfig {
    let mut rules = Vec::new();
    for (key, value) in props.iter() {
        let key: &str = key;
        let value: &str = value;
        let mut parts = value.split_whitespace();
        let Some(dest_id) = parts.next() else { continue };
        let mut priority = 0u8;
        for rest in parts {
            if let Some(p) = rest.strip_prefix("priority=") {
                priority = p.parse().unwrap_or(0);
            }
        }
        rules.push(TagMapRuleConfig { source_key: key.to_string(), dest_id: dest_id.to_string(), priority });
    }
    TagMapConfig { id: id.to_string(), rules }
}

/// Cross-section checks (§6): every destination's `source`/`tagmap`
/// reference must resolve.
fn validate(config: &ProgramConfig) -> ConfigResult<()> {
    for dest in &config.destinations {
        if config.source(&dest.source).is_none() {
            return Err(ConfigError::UnknownSource { destination: dest.id.clone(), source: dest.source.clone() });
        }
        if let TagMapSelector::Named(id) = &dest.tagmap {
            if config.tagmap(id).is_none() {
                return Err(ConfigError::UnknownTagMap { destination: dest.id.clone(), tagmap: id.clone() });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagMapSelector;

    const SAMPLE: &str = r#"
[options]
stop-on-source-ending = true
log-level = debug

[source.radio1]
input = network
input-url = http://example.invalid/stream
input-connect-timeout = 5000
demuxer = auto
decoder = pcm
decoder-bit-depth = 16
filter = passthrough

[destination.d1]
source = radio1
tagmap = tm1
images = out-of-band
unknown-tags = txxx
duplicate-tags = semicolon
filter = buffer
filter-frame-length = 1024
encoder = pcm
muxer = fmp4
muxer-target-duration = 6
output = folder
output-root = /tmp/hls

[tagmap.tm1]
title = TIT2 priority=5
artist = TPE1
"#;

    #[test]
    fn parses_full_sample() {
        let cfg = parse_str(SAMPLE).expect("sample config should parse");
        assert!(cfg.options.stop_on_source_ending);
        assert_eq!(cfg.options.log_level, LogLevel::Debug);

        assert_eq!(cfg.sources.len(), 1);
        let src = &cfg.sources[0];
        assert_eq!(src.input.plugin.as_deref(), Some("network"));
        assert_eq!(
            src.input.settings,
            vec![
                ("url".to_string(), "http://example.invalid/stream".to_string()),
                ("connect-timeout".to_string(), "5000".to_string()),
            ]
        );
        assert_eq!(src.decoder.settings, vec![("bit-depth".to_string(), "16".to_string())]);

        assert_eq!(cfg.destinations.len(), 1);
        let dest = &cfg.destinations[0];
        assert_eq!(dest.source, "radio1");
        assert_eq!(dest.tagmap, TagMapSelector::Named("tm1".to_string()));
        assert_eq!(dest.muxer.settings, vec![("target-duration".to_string(), "6".to_string())]);
        assert_eq!(dest.output.settings, vec![("root".to_string(), "/tmp/hls".to_string())]);

        assert_eq!(cfg.tagmaps.len(), 1);
        let tm = &cfg.tagmaps[0];
        assert_eq!(tm.rules.len(), 2);
        assert_eq!(tm.rules[0].dest_id, "TIT2");
        assert_eq!(tm.rules[0].priority, 5);
    }

    #[test]
    fn bare_key_before_any_selector_is_an_error() {
        let text = "[source.a]\nurl = http://x\n";
        let err = parse_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::NoActiveStage { .. }));
    }

    #[test]
    fn destination_referencing_unknown_source_is_rejected() {
        let text = "[destination.d]\nsource = nope\noutput = stdout\n";
        let err = parse_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSource { .. }));
    }

    #[test]
    fn destination_missing_source_key_is_rejected() {
        let text = "[destination.d]\noutput = stdout\n";
        let err = parse_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }

    #[test]
    fn tagmap_disable_is_recognised() {
        let text = "[source.a]\ninput=file\ninput-path=/tmp/a\n[destination.d]\nsource=a\ntagmap=disable\noutput=stdout\n";
        let cfg = parse_str(text).unwrap();
        assert_eq!(cfg.destinations[0].tagmap, TagMapSelector::Disabled);
    }
}
