//! Closed category code sets shared by validation, ingestion, and the CSV
//! mirror, plus the alias tables for historical spellings. Every module
//! resolves free-text values through here; nothing rebuilds its own lookup.

/// Case-insensitive member resolution: canonical code first, then the
/// curated alias list. No fuzzy matching; unknown input is `None` and the
/// caller decides whether that is fatal.
fn resolve_member<T: Copy>(
    members: &'static [T],
    as_str: fn(T) -> &'static str,
    aliases: &'static [(&'static str, T)],
    value: &str,
) -> Option<T> {
    let needle = value.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    members
        .iter()
        .copied()
        .find(|member| as_str(*member).eq_ignore_ascii_case(&needle))
        .or_else(|| {
            aliases
                .iter()
                .find(|(alias, _)| *alias == needle)
                .map(|(_, member)| *member)
        })
}

macro_rules! category_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $code:literal),+ $(,)?
        }
        aliases: [ $(($alias:literal, $target:ident)),* $(,)? ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const MEMBERS: &'static [Self] = &[$(Self::$variant,)+];

            const ALIASES: &'static [(&'static str, Self)] = &[$(($alias, Self::$target),)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            pub fn from_label(value: &str) -> Option<Self> {
                resolve_member(Self::MEMBERS, Self::as_str, Self::ALIASES, value)
            }
        }
    };
}

category_enum! {
    /// Sequencing technologies.
    SeqTechName {
        Illumina => "ILLUMINA",
        Mgi => "MGI",
        Ont => "ONT",
        Pacbio => "PACBIO",
        Tenx => "TENX",
    }
    aliases: [("10x genomics", Tenx), ("10x", Tenx)]
}

category_enum! {
    /// Sequencing targets.
    SeqTechTarget {
        Wgs => "WGS",
        Wes => "WES",
    }
    aliases: []
}

category_enum! {
    /// Platform read-length classes.
    SeqTechPlatformType {
        Srs => "SRS",
        Lrs => "LRS",
        Synthetic => "SYNTHETIC",
    }
    aliases: []
}

category_enum! {
    /// Variant caller names.
    CallerName {
        DeepVariant => "DEEPVARIANT",
        Gatk => "GATK",
        Gatk3 => "GATK3",
        Gatk4 => "GATK4",
        Clair3 => "CLAIR3",
        Dragen => "DRAGEN",
        LongRanger => "LONGRANGER",
        MegaBolt => "MEGABOLT",
        NanoCaller => "NANOCALLER",
        Parabrick => "PARABRICK",
        Pepper => "PEPPER",
    }
    aliases: []
}

category_enum! {
    /// Variant caller families.
    CallerType {
        Ml => "ML",
        Traditional => "TRADITIONAL",
    }
    aliases: []
}

category_enum! {
    /// Benchmarking truth sets.
    TruthSetName {
        Giab => "GIAB",
        Cmrg => "CMRG",
        T2t => "T2T",
    }
    aliases: []
}

category_enum! {
    /// Truth set reference genomes.
    TruthSetReference {
        Grch37 => "GRCH37",
        Grch38 => "GRCH38",
    }
    aliases: []
}

category_enum! {
    /// Benchmarking samples.
    TruthSetSample {
        Hg001 => "HG001",
        Hg002 => "HG002",
        Hg003 => "HG003",
        Hg004 => "HG004",
        Hcc1395 => "HCC1395",
    }
    aliases: []
}

category_enum! {
    /// Variant origins.
    VariantOrigin {
        Germline => "GERMLINE",
        Somatic => "SOMATIC",
    }
    aliases: []
}

category_enum! {
    /// Variant size classes.
    VariantSize {
        Small => "SMALL",
        Large => "LARGE",
    }
    aliases: []
}

category_enum! {
    /// Variant classes.
    VariantType {
        Snp => "SNP",
        Indel => "INDEL",
        Del => "DEL",
        Ins => "INS",
        SnpIndel => "SNPINDEL",
    }
    aliases: [("snp+indel", SnpIndel), ("snpindel", SnpIndel)]
}

category_enum! {
    /// Benchmarking tools.
    BenchmarkToolName {
        Happy => "HAPPY",
        VcfDist => "VCFDIST",
        Truvari => "TRUVARI",
    }
    aliases: [("hap.py", Happy), ("happy", Happy)]
}

/// Genomic region stratifications from hap.py output. `as_str` is the stable
/// storage code; `happy_label` is the raw label the tool writes; the display
/// name is what the dashboard shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionType {
    All,
    Easy,
    Difficult,
    GcVeryLow,
    Gc15To20,
    Gc20To25,
    Gc25To30,
    Gc30To55,
    Gc55To60,
    Gc60To65,
    Gc65To70,
    Gc70To75,
    Gc75To80,
    Gc80To85,
    GcVeryHigh,
    RefseqCds,
    NotInCds,
    Segdup,
    Homopolymer4To6,
    Homopolymer7To11,
    HomopolymerGt11,
    LowMappability,
    Mhc,
    TsBoundary,
    TsContained,
}

impl RegionType {
    pub const MEMBERS: &'static [Self] = &[
        Self::All,
        Self::Easy,
        Self::Difficult,
        Self::GcVeryLow,
        Self::Gc15To20,
        Self::Gc20To25,
        Self::Gc25To30,
        Self::Gc30To55,
        Self::Gc55To60,
        Self::Gc60To65,
        Self::Gc65To70,
        Self::Gc70To75,
        Self::Gc75To80,
        Self::Gc80To85,
        Self::GcVeryHigh,
        Self::RefseqCds,
        Self::NotInCds,
        Self::Segdup,
        Self::Homopolymer4To6,
        Self::Homopolymer7To11,
        Self::HomopolymerGt11,
        Self::LowMappability,
        Self::Mhc,
        Self::TsBoundary,
        Self::TsContained,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Easy => "EASY",
            Self::Difficult => "DIFFICULT",
            Self::GcVeryLow => "GC_VERY_LOW",
            Self::Gc15To20 => "GC_15_20",
            Self::Gc20To25 => "GC_20_25",
            Self::Gc25To30 => "GC_25_30",
            Self::Gc30To55 => "GC_30_55",
            Self::Gc55To60 => "GC_55_60",
            Self::Gc60To65 => "GC_60_65",
            Self::Gc65To70 => "GC_65_70",
            Self::Gc70To75 => "GC_70_75",
            Self::Gc75To80 => "GC_75_80",
            Self::Gc80To85 => "GC_80_85",
            Self::GcVeryHigh => "GC_VERY_HIGH",
            Self::RefseqCds => "REFSEQ_CDS",
            Self::NotInCds => "NOT_IN_CDS",
            Self::Segdup => "SEGDUP",
            Self::Homopolymer4To6 => "HOMOPOLYMER_4TO6",
            Self::Homopolymer7To11 => "HOMOPOLYMER_7TO11",
            Self::HomopolymerGt11 => "HOMOPOLYMER_GT11",
            Self::LowMappability => "LOW_MAPPABILITY",
            Self::Mhc => "MHC",
            Self::TsBoundary => "TS_BOUNDARY",
            Self::TsContained => "TS_CONTAINED",
        }
    }

    /// Raw region label as written by hap.py in the `Subset` column.
    pub fn happy_label(self) -> &'static str {
        match self {
            Self::All => "*",
            Self::Easy => "easy",
            Self::Difficult => "difficult",
            Self::GcVeryLow => "GC_<15",
            Self::Gc15To20 => "GC_15_20",
            Self::Gc20To25 => "GC_20_25",
            Self::Gc25To30 => "GC_25_30",
            Self::Gc30To55 => "GC_30_55",
            Self::Gc55To60 => "GC_55_60",
            Self::Gc60To65 => "GC_60_65",
            Self::Gc65To70 => "GC_65_70",
            Self::Gc70To75 => "GC_70_75",
            Self::Gc75To80 => "GC_75_80",
            Self::Gc80To85 => "GC_80_85",
            Self::GcVeryHigh => "GC_>85",
            Self::RefseqCds => "refseq_cds",
            Self::NotInCds => "not_in_cds",
            Self::Segdup => "segdup",
            Self::Homopolymer4To6 => "homopolymer_4to6",
            Self::Homopolymer7To11 => "homopolymer_7to11",
            Self::HomopolymerGt11 => "homopolymer_gt11",
            Self::LowMappability => "low_mappability",
            Self::Mhc => "MHC",
            Self::TsBoundary => "TS_boundary",
            Self::TsContained => "TS_contained",
        }
    }

    /// Dashboard-facing name, kept for mirror/report readability.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::All => "All Regions",
            Self::Easy => "Easy Regions",
            Self::Difficult => "Difficult Regions",
            Self::GcVeryLow => "GC_<15",
            Self::Gc15To20 => "GC_15_20",
            Self::Gc20To25 => "GC_20_25",
            Self::Gc25To30 => "GC_25_30",
            Self::Gc30To55 => "GC_30_55",
            Self::Gc55To60 => "GC_55_60",
            Self::Gc60To65 => "GC_60_65",
            Self::Gc65To70 => "GC_65_70",
            Self::Gc70To75 => "GC_70_75",
            Self::Gc75To80 => "GC_75_80",
            Self::Gc80To85 => "GC_80_85",
            Self::GcVeryHigh => "GC_>85",
            Self::RefseqCds => "RefSeq CDS",
            Self::NotInCds => "Non-CDS Regions",
            Self::Segdup => "Segmental Duplications",
            Self::Homopolymer4To6 => "Homopolymer 4-6bp",
            Self::Homopolymer7To11 => "Homopolymer 7-11bp",
            Self::HomopolymerGt11 => "Homopolymer >11bp",
            Self::LowMappability => "Low Mappability",
            Self::Mhc => "MHC Region",
            Self::TsBoundary => "Truth Set Boundary",
            Self::TsContained => "Truth Set Contained",
        }
    }

    /// Resolve a region label from any of its spellings: the hap.py raw
    /// label, the storage code, or the display name. Comparison ignores case
    /// and punctuation so `GC_<15` and `gc15` coincide.
    pub fn from_label(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed == "*" {
            return Some(Self::All);
        }

        let needle = Self::fold_label(trimmed);
        if needle.is_empty() {
            return None;
        }

        Self::MEMBERS.iter().copied().find(|region| {
            Self::fold_label(region.as_str()) == needle
                || Self::fold_label(region.happy_label()) == needle
                || Self::fold_label(region.display_name()) == needle
        })
    }

    fn fold_label(value: &str) -> String {
        value
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_lowercase()
    }
}
