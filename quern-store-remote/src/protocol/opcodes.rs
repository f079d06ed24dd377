use crate::error::RemoteStoreError;

/// Worker operation codes. The numbering is stable across the protocol
/// versions this client negotiates; entries without a client method are kept
/// so replies mentioning them stay diagnosable.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOp {
    IsValidPath = 1,
    HasSubstitutes = 3,
    QueryPathHash = 4,   // obsolete
    QueryReferences = 5, // obsolete
    QueryReferrers = 6,
    AddToStore = 7,
    AddTextToStore = 8,
    BuildPaths = 9,
    EnsurePath = 10,
    AddTempRoot = 11,
    AddIndirectRoot = 12,
    SyncWithGC = 13,
    FindRoots = 14,
    ExportPath = 16,   // obsolete
    QueryDeriver = 18, // obsolete
    SetOptions = 19,
    CollectGarbage = 20,
    QuerySubstitutablePathInfo = 21,
    QueryDerivationOutputs = 22,
    QueryAllValidPaths = 23,
    QueryFailedPaths = 24,
    ClearFailedPaths = 25,
    QueryPathInfo = 26,
    QueryDerivationOutputNames = 31,
    QueryPathFromHashPart = 32,
    QuerySubstitutablePaths = 34,
    QueryValidPaths = 35,
    QueryValidDerivers = 36,
    OptimiseStore = 37,
    VerifyStore = 38,
    BuildDerivation = 39,
    AddSignatures = 40,
    NarFromPath = 41,
    AddToStoreNar = 42,
    QueryMissing = 43,
}

impl TryFrom<u64> for WorkerOp {
    type Error = RemoteStoreError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::IsValidPath),
            3 => Ok(Self::HasSubstitutes),
            4 => Ok(Self::QueryPathHash),
            5 => Ok(Self::QueryReferences),
            6 => Ok(Self::QueryReferrers),
            7 => Ok(Self::AddToStore),
            8 => Ok(Self::AddTextToStore),
            9 => Ok(Self::BuildPaths),
            10 => Ok(Self::EnsurePath),
            11 => Ok(Self::AddTempRoot),
            12 => Ok(Self::AddIndirectRoot),
            13 => Ok(Self::SyncWithGC),
            14 => Ok(Self::FindRoots),
            16 => Ok(Self::ExportPath),
            18 => Ok(Self::QueryDeriver),
            19 => Ok(Self::SetOptions),
            20 => Ok(Self::CollectGarbage),
            21 => Ok(Self::QuerySubstitutablePathInfo),
            22 => Ok(Self::QueryDerivationOutputs),
            23 => Ok(Self::QueryAllValidPaths),
            24 => Ok(Self::QueryFailedPaths),
            25 => Ok(Self::ClearFailedPaths),
            26 => Ok(Self::QueryPathInfo),
            31 => Ok(Self::QueryDerivationOutputNames),
            32 => Ok(Self::QueryPathFromHashPart),
            34 => Ok(Self::QuerySubstitutablePaths),
            35 => Ok(Self::QueryValidPaths),
            36 => Ok(Self::QueryValidDerivers),
            37 => Ok(Self::OptimiseStore),
            38 => Ok(Self::VerifyStore),
            39 => Ok(Self::BuildDerivation),
            40 => Ok(Self::AddSignatures),
            41 => Ok(Self::NarFromPath),
            42 => Ok(Self::AddToStoreNar),
            43 => Ok(Self::QueryMissing),
            _ => Err(RemoteStoreError::decode(
                "opcode",
                format!("unknown operation code {value}"),
            )),
        }
    }
}
