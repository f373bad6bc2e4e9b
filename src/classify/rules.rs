/// A controlled vocabulary that can tag free text.
pub trait Vocabulary: Send + Sync {
    fn classify(&self, text: &str) -> Option<String>;
}

/// Ordered `(pattern, label)` pairs; the first pattern found as a lowercase substring wins.
pub struct RuleTable {
    rules: &'static [(&'static str, &'static str)],
}

impl RuleTable {
    pub const fn new(rules: &'static [(&'static str, &'static str)]) -> Self {
        Self { rules }
    }
}

impl Vocabulary for RuleTable {
    fn classify(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern))
            .map(|(_, label)| label.to_string())
    }
}

pub static PLATFORMS: RuleTable = RuleTable::new(&[
    ("international space station", "ISS"),
    ("iss", "ISS"),
    ("space shuttle", "Space Shuttle"),
    ("sts", "Space Shuttle"),
    ("spacelab", "Spacelab"),
    ("mir", "Mir"),
    ("soyuz", "Soyuz"),
    ("falcon 9", "Falcon 9"),
    ("dragon", "SpaceX Dragon"),
    ("orbiter", "Space Shuttle"),
]);

pub static ORGANISMS: RuleTable = RuleTable::new(&[
    ("arabidopsis", "Arabidopsis thaliana"),
    ("mus musculus", "Mus musculus"),
    ("mouse", "Mus musculus"),
    ("mice", "Mus musculus"),
    ("homo sapiens", "Homo sapiens"),
    ("human", "Homo sapiens"),
    ("drosophila", "Drosophila melanogaster"),
    ("zebrafish", "Danio rerio"),
    ("danio rerio", "Danio rerio"),
    ("yeast", "Saccharomyces cerevisiae"),
    ("ecoli", "Escherichia coli"),
    ("escherichia coli", "Escherichia coli"),
    ("bacillus subtilis", "Bacillus subtilis"),
    ("lettuce", "Lactuca sativa"),
    ("spinach", "Spinacia oleracea"),
    ("wheat", "Triticum aestivum"),
    ("soybean", "Glycine max"),
    ("rice", "Oryza sativa"),
    ("arabidopsis thaliana", "Arabidopsis thaliana"),
    ("c. elegans", "Caenorhabditis elegans"),
    ("caenorhabditis elegans", "Caenorhabditis elegans"),
]);

pub static EXPERIMENT_TYPES: RuleTable = RuleTable::new(&[
    ("radiation", "Space Radiation Biology"),
    ("dosimetry", "Space Radiation Biology"),
    ("microgravity", "Microgravity Research"),
    ("bone", "Musculoskeletal Adaptation"),
    ("muscle", "Musculoskeletal Adaptation"),
    ("plant", "Space Botany"),
    ("seed", "Space Botany"),
    ("germination", "Space Botany"),
    ("genomic", "Omics & Genomics"),
    ("transcript", "Omics & Genomics"),
    ("protein", "Proteomics"),
    ("bacteria", "Microbiology"),
    ("bacterial", "Microbiology"),
    ("immune", "Immunology"),
    ("cardio", "Cardiovascular Research"),
]);
