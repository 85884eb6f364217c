/// Identifier of a generated asset. Used as the metadata key and as the
/// base name of every file persisted for the asset.
pub type AssetId = String;
